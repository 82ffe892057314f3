use std::sync::Arc;

use crate::config::{AppConfig, RuntimeConfig};
use crate::error::Result;
use crate::guardrails::{GuardrailChecker, Judge, LlmJudge};
use crate::handoff::{HandoffRouter, LlmRouter, Router};
use crate::provider::ProviderSet;
use crate::registry::AgentRegistry;
use crate::telemetry::TelemetryCollector;

/// Everything a run needs besides the agent itself.
///
/// Cheap to clone; clones share the registry and telemetry.
#[derive(Clone)]
pub struct AgentContext {
    registry: AgentRegistry,
    providers: ProviderSet,
    judge: Arc<dyn Judge>,
    router: Arc<dyn Router>,
    settings: RuntimeConfig,
    telemetry: Option<TelemetryCollector>,
}

impl AgentContext {
    /// A context whose guardrails and handoffs are decided by the providers themselves.
    pub fn new(providers: ProviderSet) -> Self {
        let settings = RuntimeConfig::default();
        Self {
            registry: AgentRegistry::new(),
            judge: Arc::new(LlmJudge::new(providers.clone())),
            router: Arc::new(LlmRouter::new(providers.clone())),
            providers,
            settings,
            telemetry: None,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let providers = ProviderSet::from_config(cfg)?;
        let judge = LlmJudge::new(providers.clone()).with_model(cfg.runtime.guardrail_model.clone());
        Ok(Self::new(providers)
            .with_judge(Arc::new(judge))
            .with_settings(cfg.runtime.clone()))
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = judge;
        self
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = router;
        self
    }

    pub fn with_settings(mut self, settings: RuntimeConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn settings(&self) -> &RuntimeConfig {
        &self.settings
    }

    pub fn telemetry(&self) -> Option<&TelemetryCollector> {
        self.telemetry.as_ref()
    }

    pub fn guardrails(&self) -> GuardrailChecker {
        GuardrailChecker::new(self.judge.clone())
    }

    pub fn handoffs(&self) -> HandoffRouter {
        HandoffRouter::new(
            self.router.clone(),
            self.registry.clone(),
            self.settings.handoff_policy,
        )
    }

    pub(crate) fn record(&self, kind: &str, agent: &str, run_id: &str, detail: serde_json::Value) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(kind, agent, run_id, detail);
        }
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::provider::StubProvider;

    #[test]
    fn contexts_can_share_one_registry() {
        let registry = AgentRegistry::new();
        let local = AgentContext::new(ProviderSet::uniform(StubProvider::new(Vec::<String>::new())))
            .with_registry(registry.clone());
        let remote = AgentContext::new(ProviderSet::uniform(StubProvider::new(Vec::<String>::new())))
            .with_registry(registry.clone());

        Agent::builder("shared", "visible everywhere").register(local.registry());

        assert!(remote.registry().contains("shared"));
        assert_eq!(registry.len(), 1);
    }
}
