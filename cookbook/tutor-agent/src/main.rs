//! Homework tutor guarded on both sides.
//!
//! Reads one prompt from stdin. Configuration comes from `--config` (default
//! `agentflow.toml`) when the file exists, otherwise from defaults and
//! `AGENTFLOW_*` variables.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use agentflow_engine::{init_tracing, Agent, AgentContext, AppConfig, RunOptions};
use clap::Parser;

/// Log filter applied by `--debug` so prompts and raw responses are shown.
const DEBUG_FILTER: &str = "info,agentflow_engine=debug";

#[derive(Parser, Debug)]
#[command(name = "tutor-agent")]
#[command(about = "Homework tutor with input and output guardrails")]
struct Cli {
    /// Log every prompt sent to the model and every raw response
    #[arg(long)]
    debug: bool,

    /// Skip the tutor's own guardrail checks
    #[arg(long)]
    no_guardrails: bool,

    /// Configuration file
    #[arg(long, default_value = "agentflow.toml")]
    config: PathBuf,
}

impl Cli {
    fn load_config(&self) -> agentflow_engine::Result<AppConfig> {
        let mut config = if self.config.is_file() {
            AppConfig::from_env_or_file(&self.config)?
        } else {
            AppConfig::from_env()?
        };
        if self.debug {
            config.logging.filter = DEBUG_FILTER.to_string();
        }
        Ok(config)
    }

    fn run_options(&self) -> RunOptions {
        let options = RunOptions::new().with_debug(self.debug);
        if self.no_guardrails {
            options.without_guardrails()
        } else {
            options
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_tracing(&config.logging);

    let ctx = AgentContext::from_config(&config)?;
    let tutor = Agent::builder("tutorAgent", "You help with homework tasks.")
        .input_guardrails("The prompt can only be math related.")
        .output_guardrails("The output can not contain a direct answer.")
        .model("gpt-3.5-turbo")
        .remote()
        .register(ctx.registry());

    print!("prompt: ");
    io::stdout().flush()?;
    let mut prompt = String::new();
    io::stdin().lock().read_line(&mut prompt)?;

    let outcome = tutor.run(&ctx, prompt.trim_end(), cli.run_options()).await?;
    println!("{outcome}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_log_filter_and_run_options() {
        let cli = Cli::parse_from(["tutor-agent", "--debug", "--config", "/nonexistent/agentflow.toml"]);

        let config = cli.load_config().unwrap();
        let options = cli.run_options();

        assert_eq!(config.logging.filter, DEBUG_FILTER);
        assert!(options.debug);
        assert!(!options.disable_guardrails);
    }

    #[test]
    fn defaults_keep_configured_filter() {
        let cli = Cli::parse_from(["tutor-agent", "--no-guardrails", "--config", "/nonexistent/agentflow.toml"]);

        let config = cli.load_config().unwrap();
        let options = cli.run_options();

        assert_ne!(config.logging.filter, DEBUG_FILTER);
        assert!(!options.debug);
        assert!(options.disable_guardrails);
    }
}
