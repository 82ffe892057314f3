//! Selection of the agent a run is delegated to.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::error::{AgentFlowError, Result};
use crate::prompt;
use crate::provider::ProviderSet;
use crate::registry::AgentRegistry;

/// Which selected names a handoff may resolve to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffPolicy {
    /// Only names in the agent's declared handoff list.
    #[default]
    Declared,
    /// Any agent present in the registry.
    Registry,
}

impl FromStr for HandoffPolicy {
    type Err = AgentFlowError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "declared" => Ok(HandoffPolicy::Declared),
            "registry" => Ok(HandoffPolicy::Registry),
            other => Err(AgentFlowError::Config(format!(
                "unknown handoff policy `{other}` (expected `declared` or `registry`)"
            ))),
        }
    }
}

/// Picks one candidate name for a delegated request.
#[async_trait]
pub trait Router: Send + Sync {
    async fn select(&self, agent: &Agent, prompt: &str, debug: bool) -> Result<String>;
}

/// Asks the agent's completion provider to name one of its handoffs.
#[derive(Clone)]
pub struct LlmRouter {
    providers: ProviderSet,
}

impl LlmRouter {
    pub fn new(providers: ProviderSet) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Router for LlmRouter {
    async fn select(&self, agent: &Agent, prompt: &str, debug: bool) -> Result<String> {
        let request = prompt::handoff_selection(agent, prompt);
        if debug {
            debug!(agent = %agent.name(), prompt = %request, "handoff prompt");
        }
        let raw = self
            .providers
            .for_kind(agent.provider_kind())
            .complete(agent.model(), &request)
            .await?;
        if debug {
            debug!(agent = %agent.name(), response = %raw, "handoff response");
        }
        Ok(raw.trim().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingFailureReason {
    /// The name is not in the agent's handoff list.
    NotACandidate,
    /// No agent with that name is registered.
    NotRegistered,
}

/// A handoff selection that could not be turned into an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingFailure {
    pub agent: String,
    pub selected: String,
    pub reason: RoutingFailureReason,
}

impl std::fmt::Display for RoutingFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            RoutingFailureReason::NotACandidate => write!(
                f,
                "Handoff failed: `{}` is not a handoff of `{}`",
                self.selected, self.agent
            ),
            RoutingFailureReason::NotRegistered => write!(
                f,
                "Handoff failed: no agent named `{}` is registered",
                self.selected
            ),
        }
    }
}

pub enum HandoffDecision {
    Delegate(Arc<Agent>),
    Rejected(RoutingFailure),
}

/// Resolves a [`Router`] answer against the registry and the handoff policy.
#[derive(Clone)]
pub struct HandoffRouter {
    router: Arc<dyn Router>,
    registry: AgentRegistry,
    policy: HandoffPolicy,
}

impl HandoffRouter {
    pub fn new(router: Arc<dyn Router>, registry: AgentRegistry, policy: HandoffPolicy) -> Self {
        Self {
            router,
            registry,
            policy,
        }
    }

    pub async fn route(&self, agent: &Agent, prompt: &str, debug: bool) -> Result<HandoffDecision> {
        let selected = self.router.select(agent, prompt, debug).await?;
        Ok(self.resolve(agent, selected))
    }

    fn resolve(&self, agent: &Agent, selected: String) -> HandoffDecision {
        let reject = |reason| {
            let failure = RoutingFailure {
                agent: agent.name().to_string(),
                selected: selected.clone(),
                reason,
            };
            warn!(agent = %failure.agent, selected = %failure.selected, ?reason, "handoff rejected");
            HandoffDecision::Rejected(failure)
        };

        if self.policy == HandoffPolicy::Declared
            && !agent.handoffs().iter().any(|h| h.name() == selected)
        {
            return reject(RoutingFailureReason::NotACandidate);
        }
        match self.registry.get(&selected) {
            Ok(target) => {
                debug!(agent = %agent.name(), target = %target.name(), "handoff selected");
                HandoffDecision::Delegate(target)
            }
            Err(_) => reject(RoutingFailureReason::NotRegistered),
        }
    }
}
