use std::sync::{Arc, RwLock};

use crate::agent::Agent;
use crate::error::{AgentFlowError, Result};

/// Append-only store of agents, looked up by name.
///
/// Clones share the same storage. Duplicate names are accepted; lookups return
/// the first agent registered under a name.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<Vec<Arc<Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a fully built agent and publish it.
    pub fn register(&self, agent: Agent) -> Arc<Agent> {
        let agent = Arc::new(agent);
        match self.agents.write() {
            Ok(mut agents) => agents.push(agent.clone()),
            Err(poisoned) => poisoned.into_inner().push(agent.clone()),
        }
        tracing::debug!(agent = %agent.name(), "registered agent");
        agent
    }

    pub fn get(&self, name: &str) -> Result<Arc<Agent>> {
        self.list()
            .into_iter()
            .find(|agent| agent.name() == name)
            .ok_or_else(|| AgentFlowError::AgentNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Snapshot of every registered agent, in registration order.
    pub fn list(&self) -> Vec<Arc<Agent>> {
        match self.agents.read() {
            Ok(agents) => agents.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.agents.read() {
            Ok(agents) => agents.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .list()
            .iter()
            .map(|agent| agent.name().to_string())
            .collect();
        f.debug_struct("AgentRegistry").field("agents", &names).finish()
    }
}
