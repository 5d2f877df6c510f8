//! The wrapped operation, in either execution shape, plus the per-call inputs.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::context::Payload;
use crate::failure::Failure;
use crate::result::{FailedReason, ResultRecord};

pub type SyncOperation<'a, T> = Box<dyn FnMut(&CancellationToken) -> Result<T, Failure> + Send + 'a>;
pub type AsyncOperation<'a, T> =
    Box<dyn FnMut(CancellationToken) -> BoxFuture<'a, Result<T, Failure>> + Send + 'a>;

/// A callable the policies can run (and re-run, for retries).
pub enum Operation<'a, T> {
    Sync(SyncOperation<'a, T>),
    Async(AsyncOperation<'a, T>),
}

impl<'a, T> Operation<'a, T> {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(&CancellationToken) -> Result<T, Failure> + Send + 'a,
    {
        Operation::Sync(Box::new(f))
    }

    pub fn from_async_fn<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, Failure>> + Send + 'a,
    {
        Operation::Async(Box::new(
            move |cancel: CancellationToken| -> BoxFuture<'a, Result<T, Failure>> {
                Box::pin(f(cancel))
            },
        ))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Operation::Async(_))
    }

    /// Run once from async code. A sync operation runs inline.
    pub(crate) async fn call_async(&mut self, cancel: &CancellationToken) -> Result<T, Failure> {
        match self {
            Operation::Sync(f) => f(cancel),
            Operation::Async(f) => f(cancel.clone()).await,
        }
    }
}

/// Everything one execute call needs: the operation, the cancel signal and
/// an optional payload for context-aware handlers.
pub struct Invocation<'a, T> {
    operation: Option<Operation<'a, T>>,
    cancel: CancellationToken,
    payload: Option<Payload>,
}

impl<'a, T> Invocation<'a, T> {
    pub fn new(operation: Operation<'a, T>) -> Self {
        Self {
            operation: Some(operation),
            cancel: CancellationToken::new(),
            payload: None,
        }
    }

    /// An invocation without an operation; policies classify it as
    /// [`FailedReason::NullOperation`] without running anything.
    pub fn missing() -> Self {
        Self {
            operation: None,
            cancel: CancellationToken::new(),
            payload: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn into_parts(self) -> (Option<Operation<'a, T>>, CancellationToken, Option<Payload>) {
        (self.operation, self.cancel, self.payload)
    }
}

/// Operation for a blocking entry point. Async-shaped operations are not
/// driven from sync code; like a missing one they are classified, not run.
pub(crate) fn take_sync<'a, T>(
    operation: Option<Operation<'a, T>>,
    record: &mut ResultRecord,
) -> Option<SyncOperation<'a, T>> {
    match operation {
        Some(Operation::Sync(f)) => Some(f),
        Some(Operation::Async(_)) => {
            tracing::warn!("async operation passed to a blocking entry point; not executed");
            record.set_failed(FailedReason::NullOperation);
            None
        }
        None => {
            tracing::warn!("no operation supplied");
            record.set_failed(FailedReason::NullOperation);
            None
        }
    }
}

pub(crate) fn take_any<'a, T>(
    operation: Option<Operation<'a, T>>,
    record: &mut ResultRecord,
) -> Option<Operation<'a, T>> {
    if operation.is_none() {
        tracing::warn!("no operation supplied");
        record.set_failed(FailedReason::NullOperation);
    }
    operation
}
