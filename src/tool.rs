use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{Agent, RunOptions};
use crate::context::AgentContext;
use crate::error::{AgentFlowError, Result};

/// A zero-argument tool producing text.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self) -> Result<String>;
}

type ToolFn = dyn Fn() -> Result<String> + Send + Sync;

/// Wrap a plain function or closure as a [`Tool`].
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// A tool whose errors are plain messages.
    pub fn fallible<F, E>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> std::result::Result<String, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        let name = name.into();
        let label = name.clone();
        Self::new(name, move || {
            func().map_err(|err| AgentFlowError::ToolInvocation {
                name: label.clone(),
                source: err.to_string().into(),
            })
        })
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self) -> Result<String> {
        (self.func)()
    }
}

/// Named tools available to agent manifests.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Something an agent runs before its own completion: a tool or a nested agent.
#[derive(Clone)]
pub enum Invocable {
    Function(Arc<dyn Tool>),
    DelegateAgent(Arc<Agent>),
    /// A declared tool that resolved to neither shape.
    Unsupported(String),
}

impl Invocable {
    pub fn function<T: Tool + 'static>(tool: T) -> Self {
        Invocable::Function(Arc::new(tool))
    }

    pub fn name(&self) -> &str {
        match self {
            Invocable::Function(tool) => tool.name(),
            Invocable::DelegateAgent(agent) => agent.name(),
            Invocable::Unsupported(name) => name,
        }
    }

    /// Invoke with the text accumulated so far; only nested agents read it.
    pub async fn invoke(
        &self,
        ctx: &AgentContext,
        input: &str,
        options: &RunOptions,
    ) -> Result<String> {
        match self {
            Invocable::Function(tool) => tool.call().await,
            Invocable::DelegateAgent(agent) => {
                let outcome = agent.run(ctx, input, options.nested()).await?;
                Ok(outcome.into_text())
            }
            Invocable::Unsupported(name) => Err(AgentFlowError::Config(format!(
                "unsupported tool type for `{name}`"
            ))),
        }
    }
}

impl std::fmt::Debug for Invocable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invocable::Function(tool) => f.debug_tuple("Function").field(&tool.name()).finish(),
            Invocable::DelegateAgent(agent) => {
                f.debug_tuple("DelegateAgent").field(&agent.name()).finish()
            }
            Invocable::Unsupported(name) => f.debug_tuple("Unsupported").field(name).finish(),
        }
    }
}

impl From<Arc<Agent>> for Invocable {
    fn from(agent: Arc<Agent>) -> Self {
        Invocable::DelegateAgent(agent)
    }
}

impl From<FunctionTool> for Invocable {
    fn from(tool: FunctionTool) -> Self {
        Invocable::Function(Arc::new(tool))
    }
}
