use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentFlowError>;

#[derive(Debug, Error)]
pub enum AgentFlowError {
    #[error("completion provider error: {0}")]
    Provider(String),

    #[error("agent `{0}` not found")]
    AgentNotFound(String),

    #[error("agent generation failed: {reason}")]
    GenerationFailure { reason: String, raw: String },

    #[error("recursion limit of {limit} exceeded while entering `{agent}` (path: {})", path.join(" -> "))]
    RecursionLimitExceeded {
        agent: String,
        limit: usize,
        path: Vec<String>,
    },

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
