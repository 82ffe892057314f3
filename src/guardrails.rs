//! Guardrail checks on agent input and output.
//!
//! A guardrail is a free-text policy attached to an agent. Whether a piece of text
//! complies is decided by a [`Judge`]; the default [`LlmJudge`] asks the agent's
//! completion provider and trusts only an exact `ok` or `triggered` answer.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::Agent;
use crate::error::{AgentFlowError, Result};
use crate::prompt;
use crate::provider::ProviderSet;

/// Which side of a run a guardrail protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailStage {
    Input,
    Output,
}

impl std::fmt::Display for GuardrailStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardrailStage::Input => f.write_str("input"),
            GuardrailStage::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardrailVerdict {
    Ok,
    Triggered,
    /// The judge answered with neither token.
    Unknown,
}

impl GuardrailVerdict {
    pub const OK_TOKEN: &'static str = "ok";
    pub const TRIGGERED_TOKEN: &'static str = "triggered";

    /// Reduce a raw judge answer to a verdict. Only surrounding whitespace is ignored.
    pub fn from_response(raw: &str) -> Self {
        match raw.trim() {
            Self::OK_TOKEN => GuardrailVerdict::Ok,
            Self::TRIGGERED_TOKEN => GuardrailVerdict::Triggered,
            _ => GuardrailVerdict::Unknown,
        }
    }
}

/// Everything a judge needs to rule on one piece of text.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub agent: &'a Agent,
    pub stage: GuardrailStage,
    pub policy: &'a str,
    pub content: &'a str,
    pub debug: bool,
}

#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: JudgeRequest<'_>) -> Result<GuardrailVerdict>;
}

/// Asks the agent's completion provider for a verdict.
#[derive(Clone)]
pub struct LlmJudge {
    providers: ProviderSet,
    model_override: Option<String>,
}

impl LlmJudge {
    pub fn new(providers: ProviderSet) -> Self {
        Self {
            providers,
            model_override: None,
        }
    }

    /// Judge every agent with `model` instead of the agent's own model.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, request: JudgeRequest<'_>) -> Result<GuardrailVerdict> {
        let check = prompt::guardrail_check(request.stage, request.policy, request.content);
        let model = self
            .model_override
            .as_deref()
            .unwrap_or_else(|| request.agent.model());
        if request.debug {
            debug!(agent = %request.agent.name(), stage = %request.stage, prompt = %check, "guardrail prompt");
        }
        let raw = self
            .providers
            .for_kind(request.agent.provider_kind())
            .complete(model, &check)
            .await?;
        if request.debug {
            debug!(agent = %request.agent.name(), stage = %request.stage, response = %raw, "guardrail response");
        }
        Ok(GuardrailVerdict::from_response(&raw))
    }
}

/// Deterministic judge: triggers when any pattern matches the content.
///
/// The policy text is ignored; the patterns are the policy.
#[derive(Debug, Clone)]
pub struct PatternJudge {
    patterns: Vec<Regex>,
}

impl PatternJudge {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref()).map_err(|err| {
                    AgentFlowError::Config(format!(
                        "invalid guardrail pattern `{}`: {err}",
                        pattern.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl Judge for PatternJudge {
    async fn judge(&self, request: JudgeRequest<'_>) -> Result<GuardrailVerdict> {
        if self.patterns.iter().any(|p| p.is_match(request.content)) {
            Ok(GuardrailVerdict::Triggered)
        } else {
            Ok(GuardrailVerdict::Ok)
        }
    }
}

/// Applies an agent's guardrails through a [`Judge`].
#[derive(Clone)]
pub struct GuardrailChecker {
    judge: Arc<dyn Judge>,
}

impl GuardrailChecker {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    /// `Ok` without consulting the judge when the agent has no input guardrail.
    pub async fn check_input(
        &self,
        agent: &Agent,
        prompt: &str,
        debug: bool,
    ) -> Result<GuardrailVerdict> {
        self.check(agent, GuardrailStage::Input, agent.input_guardrails(), prompt, debug)
            .await
    }

    /// `Ok` without consulting the judge when the agent has no output guardrail.
    pub async fn check_output(
        &self,
        agent: &Agent,
        text: &str,
        debug: bool,
    ) -> Result<GuardrailVerdict> {
        self.check(agent, GuardrailStage::Output, agent.output_guardrails(), text, debug)
            .await
    }

    async fn check(
        &self,
        agent: &Agent,
        stage: GuardrailStage,
        policy: Option<&str>,
        content: &str,
        debug: bool,
    ) -> Result<GuardrailVerdict> {
        let Some(policy) = policy else {
            return Ok(GuardrailVerdict::Ok);
        };
        let verdict = self
            .judge
            .judge(JudgeRequest {
                agent,
                stage,
                policy,
                content,
                debug,
            })
            .await?;
        debug!(agent = %agent.name(), %stage, ?verdict, "guardrail verdict");
        Ok(verdict)
    }
}
