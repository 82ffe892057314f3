//! Declarative agent rosters loaded from TOML.
//!
//! ```toml
//! [[agents]]
//! name = "mathAgent"
//! instruction = "Solves arithmetic step by step"
//! tools = ["clock"]
//!
//! [[agents]]
//! name = "triage"
//! instruction = "Routes questions"
//! handoffs = ["mathAgent"]
//! input_guardrails = "Only homework questions"
//! ```
//!
//! Agents are installed in file order, so tools and handoffs may only name
//! agents declared earlier (or already registered in the context).

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::context::AgentContext;
use crate::error::{AgentFlowError, Result};
use crate::provider::ProviderKind;
use crate::tool::{Invocable, ToolRegistry};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub instruction: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub handoffs: Vec<String>,
    #[serde(default)]
    pub input_guardrails: Option<String>,
    #[serde(default)]
    pub output_guardrails: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AgentManifest {
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl AgentManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| AgentFlowError::Config(format!("invalid agent manifest: {err}")))
    }

    /// Register every declared agent with `ctx`, returning them in file order.
    ///
    /// Handoff names are checked before anything is registered.
    pub fn install(&self, ctx: &AgentContext, tools: &ToolRegistry) -> Result<Vec<Arc<Agent>>> {
        self.check_handoffs(ctx)?;

        let settings = ctx.settings();
        let mut installed = Vec::with_capacity(self.agents.len());
        for spec in &self.agents {
            let mut builder = Agent::builder(&spec.name, &spec.instruction)
                .model(spec.model.clone().unwrap_or_else(|| settings.default_model.clone()))
                .provider(spec.provider.unwrap_or(settings.default_provider));

            for tool in &spec.tools {
                builder = builder.tool(resolve_tool(ctx, tools, tool));
            }
            for handoff in &spec.handoffs {
                builder = builder.handoff(ctx.registry().get(handoff)?);
            }
            if let Some(policy) = &spec.input_guardrails {
                builder = builder.input_guardrails(policy);
            }
            if let Some(policy) = &spec.output_guardrails {
                builder = builder.output_guardrails(policy);
            }
            installed.push(builder.register(ctx.registry()));
        }
        info!(count = installed.len(), "installed agent manifest");
        Ok(installed)
    }

    fn check_handoffs(&self, ctx: &AgentContext) -> Result<()> {
        let mut declared: HashSet<&str> = HashSet::new();
        for spec in &self.agents {
            for handoff in &spec.handoffs {
                if !declared.contains(handoff.as_str()) && !ctx.registry().contains(handoff) {
                    return Err(AgentFlowError::Config(format!(
                        "agent `{}` hands off to unknown agent `{handoff}`",
                        spec.name
                    )));
                }
            }
            declared.insert(spec.name.as_str());
        }
        Ok(())
    }
}

fn resolve_tool(ctx: &AgentContext, tools: &ToolRegistry, name: &str) -> Invocable {
    if let Some(tool) = tools.get(name) {
        return Invocable::Function(tool);
    }
    match ctx.registry().get(name) {
        Ok(agent) => Invocable::DelegateAgent(agent),
        Err(_) => {
            warn!(tool = %name, "manifest names an unknown tool");
            Invocable::Unsupported(name.to_string())
        }
    }
}
