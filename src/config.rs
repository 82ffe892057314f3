use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentFlowError, Result};
use crate::handoff::HandoffPolicy;
use crate::provider::ProviderKind;

pub const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub handoff_policy: HandoffPolicy,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub default_provider: ProviderKind,
    /// Model used for guardrail checks instead of the agent's own model.
    #[serde(default)]
    pub guardrail_model: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            handoff_policy: HandoffPolicy::default(),
            default_model: default_model(),
            default_provider: ProviderKind::default(),
            guardrail_model: None,
        }
    }
}

fn default_max_depth() -> usize {
    8
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            organization: None,
            timeout_secs: default_remote_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_remote_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: default_local_timeout(),
        }
    }
}

fn default_program() -> String {
    "ollama".into()
}

fn default_args() -> Vec<String> {
    vec!["run".into()]
}

fn default_local_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| AgentFlowError::Config(format!("Failed to parse configuration: {err}")))
    }

    /// Defaults plus environment overrides, for hosts without a config file.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(depth) = env::var("AGENTFLOW_MAX_DEPTH") {
            self.runtime.max_depth = depth.parse().map_err(|_| {
                AgentFlowError::Config(format!("AGENTFLOW_MAX_DEPTH is not a number: `{depth}`"))
            })?;
        }
        if let Ok(policy) = env::var("AGENTFLOW_HANDOFF_POLICY") {
            self.runtime.handoff_policy = policy.parse()?;
        }
        if let Ok(model) = env::var("AGENTFLOW_DEFAULT_MODEL") {
            self.runtime.default_model = model;
        }
        if let Ok(model) = env::var("AGENTFLOW_GUARDRAIL_MODEL") {
            self.runtime.guardrail_model = Some(model);
        }
        if let Ok(key) = env::var("AGENTFLOW_OPENAI_API_KEY").or_else(|_| env::var("OPENAI_API_KEY"))
        {
            self.remote.api_key = Some(key);
        }
        if let Ok(base_url) = env::var("AGENTFLOW_OPENAI_BASE_URL") {
            self.remote.base_url = base_url;
        }
        if let Ok(program) = env::var("AGENTFLOW_OLLAMA_PROGRAM") {
            self.local.program = program;
        }
        if let Ok(filter) = env::var("AGENTFLOW_LOG") {
            self.logging.filter = filter;
        }
        if let Ok(json) = env::var("AGENTFLOW_LOG_JSON") {
            self.logging.json = json.parse().map_err(|_| {
                AgentFlowError::Config(format!(
                    "AGENTFLOW_LOG_JSON must be `true` or `false`, got `{json}`"
                ))
            })?;
        }
        Ok(())
    }
}
