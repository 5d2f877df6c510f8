//! Safe backoff: waits that trap cancellation and timer failures instead of
//! propagating them, plus the handler that plugs a delay strategy into the
//! error pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::delay::DelayStrategy;
use super::error::BackoffError;
use crate::cancel::{CancelKind, Canceled};
use crate::context::AttemptContext;
use crate::failure::Failure;
use crate::handler::ErrorHandler;

/// Upper bound on how long a blocking wait goes without re-checking the cancel signal.
pub const WAIT_SLICE: Duration = Duration::from_millis(10);

/// How a backoff wait ended.
#[derive(Debug, Clone)]
pub enum BackoffOutcome {
    Completed,
    /// The cancel signal fired before or during the wait.
    Canceled(Failure),
    /// The wait mechanism itself failed.
    Failed(Failure),
}

impl BackoffOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BackoffOutcome::Completed)
    }

    /// Completed maps to `Ok`; the other two surface their failure.
    pub fn into_result(self) -> Result<(), Failure> {
        match self {
            BackoffOutcome::Completed => Ok(()),
            BackoffOutcome::Canceled(f) | BackoffOutcome::Failed(f) => Err(f),
        }
    }
}

fn wait_canceled() -> BackoffOutcome {
    BackoffOutcome::Canceled(Failure::new(Canceled::new(CancelKind::Wait)))
}

/// Block the current thread for `delay`, waking at least every [`WAIT_SLICE`]
/// to observe `cancel`.
pub fn wait_blocking(delay: Duration, cancel: &CancellationToken) -> BackoffOutcome {
    if cancel.is_cancelled() {
        return wait_canceled();
    }
    let Some(deadline) = Instant::now().checked_add(delay) else {
        return BackoffOutcome::Failed(Failure::new(BackoffError::OutOfRange(delay)));
    };
    loop {
        if cancel.is_cancelled() {
            return wait_canceled();
        }
        let now = Instant::now();
        if now >= deadline {
            return BackoffOutcome::Completed;
        }
        std::thread::sleep((deadline - now).min(WAIT_SLICE));
    }
}

/// Suspend for `delay` or until `cancel` fires, whichever comes first.
pub async fn wait_async(delay: Duration, cancel: &CancellationToken) -> BackoffOutcome {
    if cancel.is_cancelled() {
        return wait_canceled();
    }
    if tokio::runtime::Handle::try_current().is_err() {
        return BackoffOutcome::Failed(Failure::new(BackoffError::NoTimer(delay)));
    }
    let Some(deadline) = tokio::time::Instant::now().checked_add(delay) else {
        return BackoffOutcome::Failed(Failure::new(BackoffError::OutOfRange(delay)));
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => wait_canceled(),
        _ = tokio::time::sleep_until(deadline) => BackoffOutcome::Completed,
    }
}

/// Error handler that waits according to a [`DelayStrategy`], keyed to the
/// failed attempt's index. Registered in the pipeline like any other handler,
/// so it shares ordering and failure isolation with diagnostics.
pub struct DelayHandler {
    strategy: Arc<dyn DelayStrategy>,
}

impl DelayHandler {
    pub fn new(strategy: Arc<dyn DelayStrategy>) -> Self {
        Self { strategy }
    }
}

impl ErrorHandler for DelayHandler {
    fn handle(
        &self,
        _failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
    ) -> Result<(), Failure> {
        let delay = self.strategy.delay(ctx.attempt());
        tracing::debug!(attempt = ctx.attempt(), ?delay, "backing off");
        wait_blocking(delay, cancel).into_result()
    }

    fn handle_async<'a>(
        &'a self,
        _failure: &'a Failure,
        ctx: &'a AttemptContext,
        cancel: &'a CancellationToken,
    ) -> futures::future::BoxFuture<'a, Result<(), Failure>> {
        Box::pin(async move {
            let delay = self.strategy.delay(ctx.attempt());
            tracing::debug!(attempt = ctx.attempt(), ?delay, "backing off");
            wait_async(delay, cancel).await.into_result()
        })
    }
}
