//! Agents designed by a model at run time.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::context::AgentContext;
use crate::error::{AgentFlowError, Result};
use crate::prompt;

/// One entry of the `agents` array a model returns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    pub instruction: String,
}

#[derive(Debug, Deserialize)]
struct Roster {
    agents: Vec<AgentDraft>,
}

pub struct AgentFactory<'a> {
    ctx: &'a AgentContext,
}

impl<'a> AgentFactory<'a> {
    pub fn new(ctx: &'a AgentContext) -> Self {
        Self { ctx }
    }

    /// Parse a generation response. Anything but a single JSON object with an
    /// `agents` array of `{name, instruction}` entries is a `GenerationFailure`.
    pub fn parse_roster(raw: &str) -> Result<Vec<AgentDraft>> {
        serde_json::from_str::<Roster>(raw.trim())
            .map(|roster| roster.agents)
            .map_err(|err| AgentFlowError::GenerationFailure {
                reason: err.to_string(),
                raw: raw.to_string(),
            })
    }

    /// Ask `agent`'s provider for new agents and register them in response order.
    ///
    /// Nothing is registered unless the whole response parses.
    pub async fn generate(&self, agent: &Agent, prompt: &str, debug: bool) -> Result<Vec<Arc<Agent>>> {
        let request = prompt::agent_generation(agent, prompt);
        if debug {
            debug!(agent = %agent.name(), prompt = %request, "generation prompt");
        }
        let raw = self
            .ctx
            .providers()
            .for_kind(agent.provider_kind())
            .complete(agent.model(), &request)
            .await?;
        if debug {
            debug!(agent = %agent.name(), response = %raw, "generation response");
        }

        let drafts = Self::parse_roster(&raw).map_err(|err| {
            warn!(agent = %agent.name(), error = %err, "agent generation failed");
            err
        })?;

        let settings = self.ctx.settings();
        let created: Vec<Arc<Agent>> = drafts
            .into_iter()
            .map(|draft| {
                Agent::builder(draft.name, draft.instruction)
                    .model(settings.default_model.clone())
                    .provider(settings.default_provider)
                    .register(self.ctx.registry())
            })
            .collect();
        info!(
            agent = %agent.name(),
            created = ?created.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "generated agents"
        );
        Ok(created)
    }
}
