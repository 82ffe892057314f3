//! Completion providers: the text-in, text-out boundary of the engine.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::{AppConfig, LocalConfig, RemoteConfig};
use crate::error::{AgentFlowError, Result};
use crate::telemetry::{Attempt, RetryPolicy};

/// Turns a prompt into response text for a given model identifier.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}

/// Selects which provider of a [`ProviderSet`] serves an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Remote,
    #[default]
    Local,
}

/// The remote and local providers available to a context.
#[derive(Clone)]
pub struct ProviderSet {
    remote: Arc<dyn CompletionProvider>,
    local: Arc<dyn CompletionProvider>,
}

impl ProviderSet {
    pub fn new(remote: Arc<dyn CompletionProvider>, local: Arc<dyn CompletionProvider>) -> Self {
        Self { remote, local }
    }

    /// Serve both provider kinds from the same provider.
    pub fn uniform(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            remote: provider.clone(),
            local: provider,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            remote: Arc::new(RemoteProvider::from_config(&cfg.remote)?),
            local: Arc::new(LocalProvider::from_config(&cfg.local)),
        })
    }

    pub fn for_kind(&self, kind: ProviderKind) -> &Arc<dyn CompletionProvider> {
        match kind {
            ProviderKind::Remote => &self.remote,
            ProviderKind::Local => &self.local,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote provider (OpenAI-compatible chat completions)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RemoteProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    organization: Option<String>,
    retry: RetryPolicy,
}

impl RemoteProvider {
    pub fn from_config(cfg: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .map_err(|err| AgentFlowError::Provider(format!("http client error: {err}")))?,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            organization: cfg.organization.clone(),
            retry: RetryPolicy {
                max_retries: cfg.max_retries,
                ..RetryPolicy::default_external_call()
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<String, Attempt> {
        let payload = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {api_key}"));
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let resp = builder.json(&payload).send().await.map_err(|err| {
            Attempt::Retry(AgentFlowError::Provider(format!("remote request error: {err}")))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = coalesce_error(status, &body);
            return Err(
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fatal(err)
                },
            );
        }

        let body: ChatResponse = resp.json().await.map_err(|err| {
            Attempt::Fatal(AgentFlowError::Provider(format!(
                "remote response parse error: {err}"
            )))
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| {
                Attempt::Fatal(AgentFlowError::Provider("remote returned no choices".into()))
            })
    }
}

fn coalesce_error(status: reqwest::StatusCode, body: &str) -> AgentFlowError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentFlowError::Provider(format!("remote rate limit exceeded: {body}"));
    }
    AgentFlowError::Provider(format!("remote request failed with {status}: {body}"))
}

#[async_trait]
impl CompletionProvider for RemoteProvider {
    #[instrument(skip_all, fields(provider = "remote", model = %model))]
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AgentFlowError::Provider("missing OpenAI API key for remote provider".into())
        })?;
        self.retry
            .retry(|_| self.send_once(api_key, model, prompt))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local provider (model runtime invoked as a subprocess)
// ─────────────────────────────────────────────────────────────────────────────

/// Runs `<program> <args..> <model>` with the prompt on stdin and returns stdout.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl LocalProvider {
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_config(&LocalConfig {
            program: program.into(),
            ..LocalConfig::default()
        })
    }

    pub fn from_config(cfg: &LocalConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::from_config(&LocalConfig::default())
    }
}

#[async_trait]
impl CompletionProvider for LocalProvider {
    #[instrument(skip_all, fields(provider = "local", program = %self.program, model = %model))]
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AgentFlowError::Provider(format!("failed to spawn `{}`: {err}", self.program))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentFlowError::Provider("child stdin was not piped".into()))?;
        let input = prompt.as_bytes().to_vec();
        let writer = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(writer, child.wait_with_output())
        })
        .await
        .map_err(|_| {
            AgentFlowError::Provider(format!(
                "`{}` timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ))
        })?;

        let output = output.map_err(|err| {
            AgentFlowError::Provider(format!("failed to wait for `{}`: {err}", self.program))
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "local model stderr");
        }
        if let Err(err) = written {
            debug!(error = %err, "prompt was not fully written to local model");
        }
        if !output.status.success() {
            return Err(AgentFlowError::Provider(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub provider
// ─────────────────────────────────────────────────────────────────────────────

/// One request observed by a [`StubProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub model: String,
    pub prompt: String,
}

/// A deterministic provider used for tests and demos: answers from a script, in order.
#[derive(Default)]
pub struct StubProvider {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl StubProvider {
    pub fn new<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    pub fn remaining(&self) -> usize {
        match self.responses.lock() {
            Ok(responses) => responses.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let call = ProviderCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
        };
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
        let next = match self.responses.lock() {
            Ok(mut responses) => responses.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.ok_or_else(|| {
            AgentFlowError::Provider("StubProvider ran out of scripted responses".into())
        })
    }
}
