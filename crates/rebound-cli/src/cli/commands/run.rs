//! `rebound run` – run a command under the configured policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rebound_core::config::ReboundConfig;
use rebound_core::retry::{ConstantDelay, DelayStrategy};
use rebound_core::{
    CancellationToken, ConfigurePolicy, Failure, FallbackPolicy, Invocation, Operation,
    PolicyResult, RetryBudget, RetryPolicy, SimplePolicy,
};

use super::process::ShellCommand;

/// Flags of `rebound run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub retries: Option<i32>,
    pub delay_ms: Option<u64>,
    pub once: bool,
    pub fallback: Option<String>,
    pub async_mode: bool,
    pub json: bool,
}

/// The run was stopped by Ctrl-C.
#[derive(Debug)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Interrupted {}

/// One of the three policies, chosen from flags and config.
#[derive(Debug, Clone)]
pub(crate) enum RunPolicy {
    Once(SimplePolicy),
    Retry(RetryPolicy),
    Fallback(FallbackPolicy<String>),
}

impl RunPolicy {
    pub(crate) fn choose(cfg: &ReboundConfig, opts: &RunOptions) -> Self {
        if opts.once {
            return RunPolicy::Once(report_failures(SimplePolicy::new()));
        }
        let fallback = match (&opts.fallback, opts.retries) {
            (Some(cmd), _) => Some(cmd.clone()),
            (None, None) => cfg.fallback.as_ref().map(|f| f.command.clone()),
            (None, Some(_)) => None,
        };
        if let Some(line) = fallback {
            let substitute = ShellCommand::shell(&line);
            let async_substitute = substitute.clone();
            let policy = FallbackPolicy::from_fn(move |cancel| substitute.run_blocking(cancel))
                .with_async_fallback(move |cancel| {
                    let cmd = async_substitute.clone();
                    async move { cmd.run_async(cancel).await }
                });
            return RunPolicy::Fallback(report_failures(policy));
        }

        let retries = opts.retries.unwrap_or(cfg.retry.retries);
        let budget = RetryBudget::with_start_count(retries, cfg.retry.start_count);
        let mut policy = report_failures(RetryPolicy::with_budget(budget));
        let strategy: Option<Arc<dyn DelayStrategy>> = match opts.delay_ms {
            Some(ms) => Some(Arc::new(ConstantDelay::new(Duration::from_millis(ms)))),
            None => cfg.retry.delay.strategy(),
        };
        if let Some(strategy) = strategy {
            policy = policy.with_delay(strategy);
        }
        RunPolicy::Retry(policy)
    }

    fn execute(&self, invocation: Invocation<'_, String>) -> PolicyResult<String> {
        match self {
            RunPolicy::Once(p) => p.execute_invocation(invocation),
            RunPolicy::Retry(p) => p.execute_invocation(invocation),
            RunPolicy::Fallback(p) => p.execute_invocation(invocation),
        }
    }

    async fn execute_async(&self, invocation: Invocation<'_, String>) -> PolicyResult<String> {
        match self {
            RunPolicy::Once(p) => p.execute_invocation_async(invocation).await,
            RunPolicy::Retry(p) => p.execute_invocation_async(invocation).await,
            RunPolicy::Fallback(p) => p.execute_invocation_async(invocation).await,
        }
    }
}

fn report_failures<P: ConfigurePolicy>(policy: P) -> P {
    policy.handle_error(|failure, ctx, _cancel| {
        eprintln!("rebound: attempt {} failed: {}", ctx.attempt() + 1, failure);
        Ok(())
    })
}

pub async fn run_command(cfg: &ReboundConfig, opts: &RunOptions, argv: &[String]) -> Result<()> {
    let command = ShellCommand::from_argv(argv)?;
    let policy = RunPolicy::choose(cfg, opts);
    tracing::info!(command = %command, ?policy, "running");

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received; canceling");
            on_ctrl_c.cancel();
        }
    });

    let result = if opts.async_mode {
        let op = Operation::from_async_fn(move |cancel| {
            let command = command.clone();
            async move { command.run_async(cancel).await }
        });
        policy
            .execute_async(Invocation::new(op).with_cancel(cancel.clone()))
            .await
    } else {
        let blocking_cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let op = Operation::from_fn(|cancel| command.run_blocking(cancel));
            policy.execute(Invocation::new(op).with_cancel(blocking_cancel))
        })
        .await?
    };
    watcher.abort();

    report(&result, opts.json)?;
    if result.is_canceled() {
        return Err(Interrupted.into());
    }
    command_outcome(result)
        .map(|_| ())
        .map_err(|f| anyhow!("{}", f))
}

/// A recorded failure with no output (the `--once` case) still fails the run.
fn command_outcome(result: PolicyResult<String>) -> Result<String, Failure> {
    if result.is_success() && result.result().is_none() {
        if let Some(failure) = result.last_error() {
            return Err(failure.clone());
        }
    }
    result.into_result()
}

fn report(result: &PolicyResult<String>, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "summary": result.summary(),
            "output": result.result(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if let Some(output) = result.result() {
        print!("{}", output);
    }
    tracing::info!(
        failed = result.is_failed(),
        canceled = result.is_canceled(),
        attempts_failed = result.errors().len(),
        "run finished"
    );
    Ok(())
}
