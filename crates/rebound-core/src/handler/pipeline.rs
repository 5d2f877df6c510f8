//! Ordered, failure-isolated execution of error handlers for one caught failure.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::ErrorHandler;
use crate::cancel::{classify_token, Classification};
use crate::context::AttemptContext;
use crate::failure::Failure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    Error,
    Canceled,
}

/// One handler's own failure.
#[derive(Debug, Clone)]
pub struct HandlerRecord {
    pub index: usize,
    pub status: HandlerStatus,
    pub error: Failure,
}

/// What running the pipeline once produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    failure: Failure,
    records: Vec<HandlerRecord>,
    is_canceled: bool,
}

impl PipelineOutcome {
    fn new(failure: &Failure) -> Self {
        Self {
            failure: failure.clone(),
            records: Vec::new(),
            is_canceled: false,
        }
    }

    /// The failure that was processed, untouched.
    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn records(&self) -> &[HandlerRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<HandlerRecord> {
        self.records
    }

    pub fn is_canceled(&self) -> bool {
        self.is_canceled
    }

    /// Cause of the early stop, when a handler raised it.
    pub fn cancel_cause(&self) -> Option<&Failure> {
        self.records
            .iter()
            .rev()
            .find(|r| r.status == HandlerStatus::Canceled)
            .map(|r| &r.error)
    }

    /// Shared by both modes so sync and async classify handler failures identically.
    /// Returns true when the pipeline must stop.
    fn record(&mut self, index: usize, error: Failure, cancel: &CancellationToken) -> bool {
        match classify_token(cancel, &error) {
            Classification::GenuineCancellation(cause) => {
                tracing::debug!(handler = index, "error handler observed cancellation");
                self.records.push(HandlerRecord {
                    index,
                    status: HandlerStatus::Canceled,
                    error: cause,
                });
                self.is_canceled = true;
                true
            }
            Classification::RegularError => {
                tracing::warn!(handler = index, error = %error, "error handler failed");
                self.records.push(HandlerRecord {
                    index,
                    status: HandlerStatus::Error,
                    error,
                });
                false
            }
        }
    }

    fn stop_if_canceled(&mut self, index: usize, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            tracing::debug!(next_handler = index, "cancel requested, skipping remaining handlers");
            self.is_canceled = true;
            return true;
        }
        false
    }
}

/// Handlers in registration order. Immutable once the owning policy is built.
#[derive(Clone, Default)]
pub struct ErrorPipeline {
    handlers: Vec<Arc<dyn ErrorHandler>>,
}

impl ErrorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler over `failure`, blocking.
    ///
    /// A handler's ordinary failure is recorded and the next handler still
    /// runs. A genuine cancellation (or a cancel request observed before the
    /// next handler) stops the pipeline.
    pub fn process(
        &self,
        failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::new(failure);
        for (index, handler) in self.handlers.iter().enumerate() {
            if outcome.stop_if_canceled(index, cancel) {
                break;
            }
            if let Err(error) = handler.handle(failure, ctx, cancel) {
                if outcome.record(index, error, cancel) {
                    break;
                }
            }
        }
        outcome
    }

    /// Async form of [`ErrorPipeline::process`]; handlers still run one at a time.
    pub async fn process_async(
        &self,
        failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::new(failure);
        for (index, handler) in self.handlers.iter().enumerate() {
            if outcome.stop_if_canceled(index, cancel) {
                break;
            }
            if let Err(error) = handler.handle_async(failure, ctx, cancel).await {
                if outcome.record(index, error, cancel) {
                    break;
                }
            }
        }
        outcome
    }
}

impl fmt::Debug for ErrorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPipeline")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
