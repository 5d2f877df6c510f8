//! Policy variants and the configuration they share.
//!
//! Every variant owns a [`PolicyCore`]: the catch block (filter plus handler
//! pipeline) and the result handlers. The builder methods on
//! [`ConfigurePolicy`] are written once against that core.

mod fallback;
mod result_handler;
mod simple;

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cancel::{classify_token, CancelKind, Canceled, Classification};
use crate::catch_block::CatchBlock;
use crate::context::AttemptContext;
use crate::failure::Failure;
use crate::filter::ErrorFilter;
use crate::handler::{ErrorHandler, HandlerFn};
use crate::result::{FailedReason, ResultRecord};

pub use fallback::{AsyncToSync, FallbackPolicy, SyncToAsync};
pub use result_handler::{ResultHandlers, ResultVerdict};
pub use simple::SimplePolicy;

/// Configuration shared by all variants. Immutable once the policy is in use.
#[derive(Debug, Clone, Default)]
pub struct PolicyCore {
    catch_block: CatchBlock,
    result_handlers: ResultHandlers,
}

impl PolicyCore {
    pub fn catch_block(&self) -> &CatchBlock {
        &self.catch_block
    }

    pub fn result_handlers(&self) -> &ResultHandlers {
        &self.result_handlers
    }

    /// Last step of every execute call that got past operation validation.
    pub(crate) fn finish(&self, record: &mut ResultRecord, cancel: &CancellationToken) {
        self.result_handlers.run(record, cancel);
        tracing::debug!(
            policy = ?record.policy(),
            failed = record.is_failed(),
            canceled = record.is_canceled(),
            errors = record.errors().len(),
            reason = ?record.failed_reason(),
            "policy finished"
        );
    }
}

/// Builder surface common to [`SimplePolicy`], [`FallbackPolicy`] and
/// [`crate::retry::RetryPolicy`].
pub trait ConfigurePolicy: Sized {
    fn core_mut(&mut self) -> &mut PolicyCore;

    /// Append a handler; handlers run in the order they are added.
    fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.core_mut().catch_block.pipeline_mut().push(handler);
        self
    }

    fn handle_error<F>(self, f: F) -> Self
    where
        F: Fn(&Failure, &AttemptContext, &CancellationToken) -> Result<(), Failure>
            + Send
            + Sync
            + 'static,
    {
        self.with_error_handler(Arc::new(HandlerFn::from_fn(f)))
    }

    /// Async handler. Sync entry points drive it to completion; see
    /// [`HandlerFn`] for how that interacts with an ambient tokio runtime.
    fn handle_error_async<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Failure, AttemptContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.with_error_handler(Arc::new(HandlerFn::from_async_fn(f)))
    }

    /// Replace the error filter wholesale.
    fn with_filter(mut self, filter: ErrorFilter) -> Self {
        *self.core_mut().catch_block.filter_mut() = filter;
        self
    }

    fn include_error<E>(self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.map_filter(ErrorFilter::include::<E>)
    }

    fn include_error_where<E, P>(self, pred: P) -> Self
    where
        E: StdError + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.map_filter(move |f| f.include_where::<E, P>(pred))
    }

    fn exclude_error<E>(self) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.map_filter(ErrorFilter::exclude::<E>)
    }

    fn exclude_error_where<E, P>(self, pred: P) -> Self
    where
        E: StdError + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.map_filter(move |f| f.exclude_where::<E, P>(pred))
    }

    fn map_filter<M>(mut self, map: M) -> Self
    where
        M: FnOnce(ErrorFilter) -> ErrorFilter,
    {
        let slot = self.core_mut().catch_block.filter_mut();
        *slot = map(std::mem::take(slot));
        self
    }

    fn with_result_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResultRecord, &CancellationToken) -> Result<ResultVerdict, Failure>
            + Send
            + Sync
            + 'static,
    {
        self.core_mut().result_handlers.push(f);
        self
    }
}

/// Marks the record canceled when the signal fired before the first attempt.
pub(crate) fn start_canceled(record: &mut ResultRecord, cancel: &CancellationToken) -> bool {
    if !cancel.is_cancelled() {
        return false;
    }
    tracing::info!(policy = ?record.policy(), "canceled before the first attempt");
    record.set_canceled(Failure::new(
        Canceled::new(CancelKind::Operation).with_message("canceled before the first attempt"),
    ));
    true
}

/// The operation raised. A genuine cancellation ends the call here without
/// running the catch block; returns true in that case.
pub(crate) fn operation_canceled(
    record: &mut ResultRecord,
    failure: &Failure,
    cancel: &CancellationToken,
) -> bool {
    record.note_raised();
    match classify_token(cancel, failure) {
        Classification::GenuineCancellation(cause) => {
            tracing::info!(policy = ?record.policy(), cause = %cause, "operation canceled");
            record.set_canceled(cause);
            true
        }
        Classification::RegularError => false,
    }
}

/// After the catch block ran: accepted failures go to `errors`, declined ones
/// fail the result as unhandled. Returns whether the failure was accepted.
pub(crate) fn book_failure(record: &mut ResultRecord, failure: Failure) -> bool {
    if record.error_filter_unsatisfied() {
        record.set_failed(FailedReason::UnhandledError);
        return false;
    }
    record.add_error(failure);
    true
}

/// Canceled marker for a cancel request observed between steps of a call.
pub(crate) fn canceled_between(stage: &str) -> Failure {
    Failure::new(Canceled::new(CancelKind::Operation).with_message(format!("canceled {}", stage)))
}
