use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::DEFAULT_MODEL;
use crate::context::AgentContext;
use crate::error::{AgentFlowError, Result};
use crate::executor::ToolExecutor;
use crate::factory::AgentFactory;
use crate::guardrails::{GuardrailStage, GuardrailVerdict};
use crate::handoff::{HandoffDecision, RoutingFailure};
use crate::prompt;
use crate::provider::ProviderKind;
use crate::registry::AgentRegistry;
use crate::tool::Invocable;

/// Returned in place of a completion that failed its output guardrail.
pub const OUTPUT_GUARDRAIL_TRIGGERED: &str = "Guardrails triggered";
/// Returned when the output guardrail verdict could not be read.
pub const OUTPUT_GUARDRAIL_UNKNOWN: &str = "Guardrails couldn't be checked";

/// Per-call switches for [`Agent::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Log every prompt and raw provider response.
    pub debug: bool,
    /// Skip this agent's input and output guardrails. Nested agents still apply theirs.
    pub disable_guardrails: bool,
    path: Vec<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn without_guardrails(mut self) -> Self {
        self.disable_guardrails = true;
        self
    }

    /// Number of enclosing runs; zero for a top-level call.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Options for a run started from inside this one.
    pub(crate) fn nested(&self) -> Self {
        Self {
            debug: self.debug,
            disable_guardrails: false,
            path: self.path.clone(),
        }
    }

    fn enter(mut self, agent: &str, max_depth: usize) -> Result<Self> {
        if self.path.len() > max_depth {
            let mut path = self.path;
            path.push(agent.to_string());
            return Err(AgentFlowError::RecursionLimitExceeded {
                agent: agent.to_string(),
                limit: max_depth,
                path,
            });
        }
        self.path.push(agent.to_string());
        Ok(self)
    }
}

/// What a run produced. Every variant carries user-visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(String),
    GuardrailTriggered {
        stage: GuardrailStage,
        message: String,
    },
    GuardrailUnknown {
        stage: GuardrailStage,
        message: String,
    },
    RoutingFailure(RoutingFailure),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunOutcome::Completed(_) => "completed",
            RunOutcome::GuardrailTriggered { .. } => "guardrail_triggered",
            RunOutcome::GuardrailUnknown { .. } => "guardrail_unknown",
            RunOutcome::RoutingFailure(_) => "routing_failure",
        }
    }

    pub fn text(&self) -> String {
        match self {
            RunOutcome::Completed(text) => text.clone(),
            RunOutcome::GuardrailTriggered { message, .. }
            | RunOutcome::GuardrailUnknown { message, .. } => message.clone(),
            RunOutcome::RoutingFailure(failure) => failure.to_string(),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            RunOutcome::Completed(text) => text,
            RunOutcome::GuardrailTriggered { message, .. }
            | RunOutcome::GuardrailUnknown { message, .. } => message,
            RunOutcome::RoutingFailure(failure) => failure.to_string(),
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// A named unit of work: instruction, model target, tools, handoffs and guardrails.
///
/// Agents are immutable once built. Publish one with [`AgentRegistry::register`]
/// (or [`AgentBuilder::register`]), which takes it by value, so each agent value is
/// registered at most once.
pub struct Agent {
    name: String,
    instruction: String,
    model: String,
    provider: ProviderKind,
    tools: Vec<Invocable>,
    handoffs: Vec<Arc<Agent>>,
    input_guardrails: Option<String>,
    output_guardrails: Option<String>,
}

impl Agent {
    pub fn builder(name: impl Into<String>, instruction: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, instruction)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider
    }

    pub fn tools(&self) -> &[Invocable] {
        &self.tools
    }

    pub fn handoffs(&self) -> &[Arc<Agent>] {
        &self.handoffs
    }

    pub fn handoff_names(&self) -> Vec<&str> {
        self.handoffs.iter().map(|agent| agent.name()).collect()
    }

    pub fn input_guardrails(&self) -> Option<&str> {
        self.input_guardrails.as_deref()
    }

    pub fn output_guardrails(&self) -> Option<&str> {
        self.output_guardrails.as_deref()
    }

    /// Run the full pipeline: input guardrail, tools, then either a handoff or a
    /// completion followed by the output guardrail.
    ///
    /// Only provider failures and the recursion bound are errors; guardrail and
    /// routing results come back as [`RunOutcome`] variants.
    pub fn run<'a>(
        &'a self,
        ctx: &'a AgentContext,
        prompt: &'a str,
        options: RunOptions,
    ) -> BoxFuture<'a, Result<RunOutcome>> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("agent_run", agent = %self.name, depth = options.depth(), run_id = %run_id);
        async move {
            let options = options.enter(&self.name, ctx.settings().max_depth)?;
            ctx.record("run_started", &self.name, &run_id, json!({ "depth": options.depth() - 1 }));
            let outcome = self.run_pipeline(ctx, prompt, &options, &run_id).await?;
            info!(outcome = outcome.kind(), "run finished");
            ctx.record("run_finished", &self.name, &run_id, json!({ "outcome": outcome.kind() }));
            Ok(outcome)
        }
        .instrument(span)
        .boxed()
    }

    async fn run_pipeline(
        &self,
        ctx: &AgentContext,
        prompt: &str,
        options: &RunOptions,
        run_id: &str,
    ) -> Result<RunOutcome> {
        let guardrails = ctx.guardrails();

        if !options.disable_guardrails && self.input_guardrails.is_some() {
            let verdict = guardrails.check_input(self, prompt, options.debug).await?;
            ctx.record("guardrail_verdict", &self.name, run_id, json!({ "stage": "input", "verdict": verdict }));
            match verdict {
                GuardrailVerdict::Ok => {}
                GuardrailVerdict::Triggered => {
                    return Ok(RunOutcome::GuardrailTriggered {
                        stage: GuardrailStage::Input,
                        message: format!("Guardrails triggered with '{prompt}'"),
                    })
                }
                GuardrailVerdict::Unknown => {
                    return Ok(RunOutcome::GuardrailUnknown {
                        stage: GuardrailStage::Input,
                        message: format!("Guardrails couldn't be checked with the prompt: '{prompt}'"),
                    })
                }
            }
        }

        let mut buffer = String::new();
        if !self.tools.is_empty() {
            let outcomes = ToolExecutor::new(ctx)
                .execute(&self.tools, prompt, &mut buffer, options)
                .await;
            for outcome in &outcomes {
                ctx.record("tool_outcome", &self.name, run_id, json!(outcome));
            }
        }

        if !self.handoffs.is_empty() {
            return match ctx.handoffs().route(self, prompt, options.debug).await? {
                HandoffDecision::Delegate(target) => {
                    if !buffer.is_empty() {
                        debug!(target = %target.name(), "tool output stays with the delegating agent");
                    }
                    ctx.record("handoff", &self.name, run_id, json!({ "target": target.name() }));
                    target.run(ctx, prompt, options.nested()).await
                }
                HandoffDecision::Rejected(failure) => {
                    ctx.record("handoff", &self.name, run_id, json!({ "rejected": failure }));
                    Ok(RunOutcome::RoutingFailure(failure))
                }
            };
        }

        let request = prompt::generation(self, prompt, &buffer);
        if options.debug {
            debug!(prompt = %request, "completion prompt");
        }
        let raw = ctx
            .providers()
            .for_kind(self.provider)
            .complete(&self.model, &request)
            .await?;
        if options.debug {
            debug!(response = %raw, "completion response");
        }
        ctx.record("completion", &self.name, run_id, json!({ "chars": raw.chars().count() }));
        buffer.push_str(&prompt::response_label(&self.name));
        buffer.push_str(&raw);

        if options.disable_guardrails || self.output_guardrails.is_none() {
            return Ok(RunOutcome::Completed(buffer));
        }
        let verdict = guardrails.check_output(self, &buffer, options.debug).await?;
        ctx.record("guardrail_verdict", &self.name, run_id, json!({ "stage": "output", "verdict": verdict }));
        Ok(match verdict {
            GuardrailVerdict::Ok => RunOutcome::Completed(buffer),
            GuardrailVerdict::Triggered => RunOutcome::GuardrailTriggered {
                stage: GuardrailStage::Output,
                message: OUTPUT_GUARDRAIL_TRIGGERED.to_string(),
            },
            GuardrailVerdict::Unknown => RunOutcome::GuardrailUnknown {
                stage: GuardrailStage::Output,
                message: OUTPUT_GUARDRAIL_UNKNOWN.to_string(),
            },
        })
    }

    /// Ask this agent's provider to design new agents for `prompt` and register them.
    pub async fn generate_agents(
        &self,
        ctx: &AgentContext,
        prompt: &str,
        options: &RunOptions,
    ) -> Result<Vec<Arc<Agent>>> {
        AgentFactory::new(ctx).generate(self, prompt, options.debug).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("tools", &self.tools)
            .field("handoffs", &self.handoff_names())
            .field("input_guardrails", &self.input_guardrails)
            .field("output_guardrails", &self.output_guardrails)
            .finish()
    }
}

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            agent: Agent {
                name: name.into(),
                instruction: instruction.into(),
                model: DEFAULT_MODEL.to_string(),
                provider: ProviderKind::default(),
                tools: Vec::new(),
                handoffs: Vec::new(),
                input_guardrails: None,
                output_guardrails: None,
            },
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.model = model.into();
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.agent.provider = provider;
        self
    }

    /// Shorthand for `provider(ProviderKind::Remote)`.
    pub fn remote(self) -> Self {
        self.provider(ProviderKind::Remote)
    }

    pub fn tool(mut self, tool: impl Into<Invocable>) -> Self {
        self.agent.tools.push(tool.into());
        self
    }

    pub fn tools<I, T>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Invocable>,
    {
        self.agent.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn handoff(mut self, agent: Arc<Agent>) -> Self {
        self.agent.handoffs.push(agent);
        self
    }

    pub fn handoffs(mut self, agents: impl IntoIterator<Item = Arc<Agent>>) -> Self {
        self.agent.handoffs.extend(agents);
        self
    }

    pub fn input_guardrails(mut self, policy: impl Into<String>) -> Self {
        self.agent.input_guardrails = Some(policy.into());
        self
    }

    pub fn output_guardrails(mut self, policy: impl Into<String>) -> Self {
        self.agent.output_guardrails = Some(policy.into());
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }

    pub fn register(self, registry: &AgentRegistry) -> Arc<Agent> {
        registry.register(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderSet, StubProvider};
    use crate::tool::FunctionTool;

    #[test]
    fn builder_defaults_to_local_llama() {
        let agent = Agent::builder("a", "i").build();
        assert_eq!(agent.model(), "llama3.1");
        assert_eq!(agent.provider_kind(), ProviderKind::Local);
        assert!(agent.input_guardrails().is_none());
        assert!(agent.tools().is_empty());
    }

    #[test]
    fn options_enforce_depth_bound() {
        let top = RunOptions::new().enter("a", 1).unwrap();
        let nested = top.nested().enter("b", 1).unwrap();
        assert_eq!(nested.depth(), 2);

        let err = nested.nested().enter("c", 1).unwrap_err();
        match err {
            AgentFlowError::RecursionLimitExceeded { agent, limit, path } => {
                assert_eq!(agent, "c");
                assert_eq!(limit, 1);
                assert_eq!(path, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_options_keep_debug_but_not_the_guardrail_switch() {
        let outer = RunOptions::new().with_debug(true).without_guardrails();
        let inner = outer.nested();
        assert!(inner.debug);
        assert!(!inner.disable_guardrails);
    }

    #[tokio::test]
    async fn completion_prompt_carries_tool_output() {
        let stub = StubProvider::new(["done"]);
        let ctx = AgentContext::new(ProviderSet::uniform(stub.clone()));
        let agent = Agent::builder("worker", "uses the clock")
            .tool(FunctionTool::new("clock", || Ok("12:00".into())))
            .register(ctx.registry());

        let outcome = agent.run(&ctx, "what time is it", RunOptions::new()).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed(" response tool: clock: 12:00 \nresponse of worker: done".into())
        );
        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("- Prompt: what time is it"));
        assert!(calls[0].prompt.contains("- Extra info:  response tool: clock: 12:00"));
    }

    #[tokio::test]
    async fn input_verdict_unknown_is_distinct_from_triggered() {
        let stub = StubProvider::new(["I am not sure"]);
        let ctx = AgentContext::new(ProviderSet::uniform(stub.clone()));
        let agent = Agent::builder("tutor", "homework")
            .input_guardrails("math only")
            .register(ctx.registry());

        let outcome = agent.run(&ctx, "2+2", RunOptions::new()).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::GuardrailUnknown {
                stage: GuardrailStage::Input,
                message: "Guardrails couldn't be checked with the prompt: '2+2'".into(),
            }
        );
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn disabled_guardrails_skip_both_checks() {
        let stub = StubProvider::new(["four"]);
        let ctx = AgentContext::new(ProviderSet::uniform(stub.clone()));
        let agent = Agent::builder("tutor", "homework")
            .input_guardrails("math only")
            .output_guardrails("no direct answers")
            .register(ctx.registry());

        let outcome = agent
            .run(&ctx, "2+2", RunOptions::new().without_guardrails())
            .await
            .unwrap();

        assert_eq!(outcome.text(), "response of tutor: four");
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_a_hard_error() {
        let stub = StubProvider::new(Vec::<String>::new());
        let ctx = AgentContext::new(ProviderSet::uniform(stub));
        let agent = Agent::builder("a", "i").register(ctx.registry());

        let err = agent.run(&ctx, "hi", RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, AgentFlowError::Provider(_)));
    }
}
