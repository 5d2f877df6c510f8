//! CLI for Rebound: run a command under a retry, fallback or no-retry policy.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rebound_core::{config, logging};

use commands::{run_command, run_config, RunOptions};

pub use commands::Interrupted;

/// Top-level CLI for Rebound.
#[derive(Debug, Parser)]
#[command(name = "rebound")]
#[command(about = "Rebound: run a command with retries, backoff and fallbacks", long_about = None)]
pub struct Cli {
    /// Log filter directives (overrides RUST_LOG), e.g. "debug" or "rebound_core=trace".
    #[arg(long, global = true, value_name = "DIRECTIVES")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a command, retrying or substituting output when it fails.
    ///
    /// Policy choice: --once runs a single attempt; --fallback uses the
    /// substitute command; --retries retries; otherwise the config file decides.
    Run {
        /// Retries after the first attempt (zero or less means 1).
        #[arg(long, value_name = "N", allow_negative_numbers = true)]
        retries: Option<i32>,

        /// Constant wait between attempts in milliseconds (overrides the configured backoff).
        #[arg(long, value_name = "MS")]
        delay_ms: Option<u64>,

        /// Run a single attempt and report the failure without retrying.
        #[arg(long, conflicts_with_all = ["retries", "delay_ms", "fallback"])]
        once: bool,

        /// Shell command whose stdout replaces the output of a failed run.
        #[arg(long, value_name = "CMD")]
        fallback: Option<String>,

        /// Drive the command asynchronously instead of on a blocking thread.
        #[arg(long = "async")]
        async_mode: bool,

        /// Print the result summary as JSON instead of the command's output.
        #[arg(long)]
        json: bool,

        /// Command and arguments to run.
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<String>,
    },

    /// Show the config file location and the effective configuration.
    Config {
        /// Print only the path.
        #[arg(long)]
        path: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let Err(e) = logging::init_logging(cli.log.as_deref()) {
            logging::init_logging_stderr(cli.log.as_deref());
            tracing::warn!("file logging unavailable ({:#}); logging to stderr", e);
        }
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                retries,
                delay_ms,
                once,
                fallback,
                async_mode,
                json,
                command,
            } => {
                let opts = RunOptions {
                    retries,
                    delay_ms,
                    once,
                    fallback,
                    async_mode,
                    json,
                };
                run_command(&cfg, &opts, &command).await?;
            }
            CliCommand::Config { path } => run_config(&cfg, path)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
