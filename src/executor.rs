use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::agent::RunOptions;
use crate::context::AgentContext;
use crate::tool::Invocable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Succeeded,
    Failed,
    Unsupported,
}

/// Result of invoking one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub status: ToolStatus,
    /// Tool output on success, failure message otherwise.
    pub text: String,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.status == ToolStatus::Succeeded
    }

    /// The entry appended to the run's response buffer.
    pub fn render(&self) -> String {
        match self.status {
            ToolStatus::Succeeded => format!(" response tool: {}: {} \n", self.tool, self.text),
            ToolStatus::Failed => format!(" response tool: {} failed: {} \n", self.tool, self.text),
            ToolStatus::Unsupported => format!(" Error: Unknown type: ({}).\n", self.tool),
        }
    }
}

/// Runs an agent's tools one after another, never stopping on a failure.
pub struct ToolExecutor<'a> {
    ctx: &'a AgentContext,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(ctx: &'a AgentContext) -> Self {
        Self { ctx }
    }

    /// Invoke every tool in order, appending each rendered outcome to `buffer`.
    ///
    /// Nested agents receive `prompt` followed by everything in `buffer` so far.
    pub async fn execute(
        &self,
        tools: &[Invocable],
        prompt: &str,
        buffer: &mut String,
        options: &RunOptions,
    ) -> Vec<ToolOutcome> {
        let mut outcomes = Vec::with_capacity(tools.len());
        for tool in tools {
            let outcome = self.invoke_one(tool, prompt, buffer, options).await;
            match outcome.status {
                ToolStatus::Succeeded => debug!(tool = %outcome.tool, "tool succeeded"),
                _ => warn!(tool = %outcome.tool, error = %outcome.text, "tool failed"),
            }
            if options.debug {
                debug!(tool = %outcome.tool, result = %outcome.text, "tool output");
            }
            buffer.push_str(&outcome.render());
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn invoke_one(
        &self,
        tool: &Invocable,
        prompt: &str,
        buffer: &str,
        options: &RunOptions,
    ) -> ToolOutcome {
        let name = tool.name().to_string();
        if let Invocable::Unsupported(_) = tool {
            return ToolOutcome {
                tool: name,
                status: ToolStatus::Unsupported,
                text: "unsupported tool type".into(),
            };
        }

        let input = format!("{prompt}{buffer}");
        let call = AssertUnwindSafe(tool.invoke(self.ctx, &input, options)).catch_unwind();
        match call.await {
            Ok(Ok(text)) => ToolOutcome {
                tool: name,
                status: ToolStatus::Succeeded,
                text,
            },
            Ok(Err(err)) => ToolOutcome {
                tool: name,
                status: ToolStatus::Failed,
                text: err.to_string(),
            },
            Err(panic) => ToolOutcome {
                tool: name,
                status: ToolStatus::Failed,
                text: panic_message(panic.as_ref()),
            },
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentFlowError;
    use crate::provider::{ProviderSet, StubProvider};
    use crate::tool::FunctionTool;

    fn context() -> AgentContext {
        AgentContext::new(ProviderSet::uniform(StubProvider::new(Vec::<String>::new())))
    }

    #[test]
    fn renders_each_status() {
        let ok = ToolOutcome {
            tool: "clock".into(),
            status: ToolStatus::Succeeded,
            text: "noon".into(),
        };
        let failed = ToolOutcome {
            tool: "disk".into(),
            status: ToolStatus::Failed,
            text: "full".into(),
        };
        let unsupported = ToolOutcome {
            tool: "ghost".into(),
            status: ToolStatus::Unsupported,
            text: String::new(),
        };

        assert_eq!(ok.render(), " response tool: clock: noon \n");
        assert_eq!(failed.render(), " response tool: disk failed: full \n");
        assert_eq!(unsupported.render(), " Error: Unknown type: (ghost).\n");
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_the_loop() {
        let ctx = context();
        let tools: Vec<Invocable> = vec![
            FunctionTool::new("first", || Ok("one".into())).into(),
            FunctionTool::new("broken", || {
                Err(AgentFlowError::Provider("no disk".into()))
            })
            .into(),
            FunctionTool::new("explodes", || panic!("boom")).into(),
            Invocable::Unsupported("ghost".into()),
            FunctionTool::new("last", || Ok("four".into())).into(),
        ];

        let mut buffer = String::new();
        let outcomes = ToolExecutor::new(&ctx)
            .execute(&tools, "prompt", &mut buffer, &RunOptions::default())
            .await;

        let statuses: Vec<ToolStatus> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                ToolStatus::Succeeded,
                ToolStatus::Failed,
                ToolStatus::Failed,
                ToolStatus::Unsupported,
                ToolStatus::Succeeded,
            ]
        );
        assert!(outcomes[0].success());
        assert!(!outcomes[1].success());
        assert!(outcomes[2].text.contains("boom"));
        assert!(buffer.starts_with(" response tool: first: one \n"));
        assert!(buffer.contains(" response tool: broken failed: completion provider error: no disk \n"));
        assert!(buffer.ends_with(" response tool: last: four \n"));
    }
}
