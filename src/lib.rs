//! Orchestration core for LLM agents.
//!
//! The crate provides:
//! - `Agent`, a named unit with an instruction, a model, tools, handoffs and guardrails.
//! - A run pipeline: input guardrail, tool execution, then either a handoff or a
//!   completion checked by the output guardrail.
//! - Pluggable completion providers (`RemoteProvider`, `LocalProvider`, `StubProvider`).
//! - `AgentContext`, which carries the registry, providers and runtime settings.
//! - Agent generation from a model-written JSON roster and TOML manifests.

mod agent;
mod config;
mod context;
mod error;
mod executor;
mod factory;
mod guardrails;
mod handoff;
mod manifest;
mod prompt;
mod provider;
mod registry;
mod telemetry;
mod tool;

pub use agent::{
    Agent, AgentBuilder, RunOptions, RunOutcome, OUTPUT_GUARDRAIL_TRIGGERED,
    OUTPUT_GUARDRAIL_UNKNOWN,
};
pub use config::{AppConfig, LocalConfig, LoggingConfig, RemoteConfig, RuntimeConfig, DEFAULT_MODEL};
pub use context::AgentContext;
pub use error::{AgentFlowError, Result};
pub use executor::{ToolExecutor, ToolOutcome, ToolStatus};
pub use factory::{AgentDraft, AgentFactory};
pub use guardrails::{
    GuardrailChecker, GuardrailStage, GuardrailVerdict, Judge, JudgeRequest, LlmJudge,
    PatternJudge,
};
pub use handoff::{
    HandoffDecision, HandoffPolicy, HandoffRouter, LlmRouter, Router, RoutingFailure,
    RoutingFailureReason,
};
pub use manifest::{AgentManifest, AgentSpec};
pub use provider::{
    CompletionProvider, LocalProvider, ProviderCall, ProviderKind, ProviderSet, RemoteProvider,
    StubProvider,
};
pub use registry::AgentRegistry;
pub use telemetry::{init_tracing, Attempt, RetryPolicy, RunEvent, TelemetryCollector};
pub use tool::{FunctionTool, Invocable, Tool, ToolRegistry};
