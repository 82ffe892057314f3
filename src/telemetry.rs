//! Logging setup, run event collection and retry of external calls.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{AgentFlowError, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. Calling this twice is harmless:
/// the second installation attempt is ignored.
pub fn init_tracing(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if cfg.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub kind: String,
    pub agent: String,
    pub run_id: String,
    pub timestamp: SystemTime,
    pub detail: serde_json::Value,
}

/// In-process sink for pipeline events, shared by every run of a context.
#[derive(Default, Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl TelemetryCollector {
    pub fn record(
        &self,
        kind: impl Into<String>,
        agent: impl Into<String>,
        run_id: impl Into<String>,
        detail: serde_json::Value,
    ) {
        let event = RunEvent {
            kind: kind.into(),
            agent: agent.into(),
            run_id: run_id.into(),
            timestamp: SystemTime::now(),
            detail,
        };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }

    /// Snapshot of the recorded events, in recording order.
    pub fn events(&self) -> Vec<RunEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.kind).collect()
    }

    pub fn drain(&self) -> Vec<RunEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn default_external_call() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(200),
        }
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Run `f` until it succeeds, the error is not retryable, or attempts run out.
    pub async fn retry<F, Fut, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, Attempt>>,
    {
        for attempt in 0..=self.max_retries {
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retry(err)) => {
                    if attempt == self.max_retries {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "retrying external call");
                    sleep(self.backoff * (attempt + 1)).await;
                }
            }
        }
        Err(AgentFlowError::Provider("retry exhausted".into()))
    }
}

/// Failure of a single attempt, classified for [`RetryPolicy::retry`].
#[derive(Debug)]
pub enum Attempt {
    Retry(AgentFlowError),
    Fatal(AgentFlowError),
}
