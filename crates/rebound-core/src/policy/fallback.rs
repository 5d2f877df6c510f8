//! Run once; on an accepted failure, produce the value from a substitute.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{
    book_failure, canceled_between, operation_canceled, start_canceled, ConfigurePolicy,
    PolicyCore,
};
use crate::cancel::{classify_token, Classification};
use crate::catch_block::CatchBlockOutcome;
use crate::context::{AttemptContext, PolicyKind};
use crate::failure::Failure;
use crate::operation::{take_any, take_sync, Invocation, Operation};
use crate::result::{CatchBlockSource, FailedReason, PolicyResult};

type SyncSubstitute<T> = Arc<dyn Fn(&CancellationToken) -> Result<T, Failure> + Send + Sync>;
type AsyncSubstitute<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T, Failure>> + Send + Sync>;

/// Presents a sync substitute to async code. Runs inline on the polling thread.
pub struct SyncToAsync<T>(SyncSubstitute<T>);

impl<T: Send + 'static> SyncToAsync<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CancellationToken) -> Result<T, Failure> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, cancel: &CancellationToken) -> BoxFuture<'static, Result<T, Failure>> {
        Box::pin(futures::future::ready((self.0)(cancel)))
    }
}

/// Presents an async substitute to sync code by driving it to completion on
/// the calling thread.
pub struct AsyncToSync<T>(AsyncSubstitute<T>);

impl<T: Send + 'static> AsyncToSync<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        Self(adapt_async(f))
    }

    pub fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        futures::executor::block_on((self.0)(cancel.clone()))
    }
}

/// Runs the operation once and swaps an accepted failure for the
/// substitute's value. Each mode has its own substitute slot; a mode with an
/// empty slot borrows the other one through [`SyncToAsync`] or [`AsyncToSync`].
pub struct FallbackPolicy<T> {
    core: PolicyCore,
    sync_substitute: Option<SyncSubstitute<T>>,
    async_substitute: Option<AsyncSubstitute<T>>,
}

impl<T> ConfigurePolicy for FallbackPolicy<T> {
    fn core_mut(&mut self) -> &mut PolicyCore {
        &mut self.core
    }
}

impl<T> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            sync_substitute: self.sync_substitute.clone(),
            async_substitute: self.async_substitute.clone(),
        }
    }
}

impl<T> fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("core", &self.core)
            .field("sync_substitute", &self.sync_substitute.is_some())
            .field("async_substitute", &self.async_substitute.is_some())
            .finish()
    }
}

impl<T: Send + 'static> FallbackPolicy<T> {
    fn empty() -> Self {
        Self {
            core: PolicyCore::default(),
            sync_substitute: None,
            async_substitute: None,
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CancellationToken) -> Result<T, Failure> + Send + Sync + 'static,
    {
        Self::empty().with_fallback(f)
    }

    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        Self::empty().with_async_fallback(f)
    }

    /// Substitute that always yields a clone of `value`.
    pub fn from_value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_fn(move |_cancel| Ok(value.clone()))
    }

    /// Set the substitute used by sync execution, replacing any previous one.
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&CancellationToken) -> Result<T, Failure> + Send + Sync + 'static,
    {
        self.sync_substitute = Some(Arc::new(f));
        self
    }

    /// Set the substitute used by async execution, replacing any previous one.
    pub fn with_async_fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        self.async_substitute = Some(adapt_async(f));
        self
    }

    pub fn core(&self) -> &PolicyCore {
        &self.core
    }

    pub fn execute<F>(&self, op: F) -> PolicyResult<T>
    where
        F: FnMut(&CancellationToken) -> Result<T, Failure> + Send,
    {
        self.execute_invocation(Invocation::new(Operation::from_fn(op)))
    }

    pub async fn execute_async<F, Fut>(&self, op: F) -> PolicyResult<T>
    where
        F: FnMut(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        self.execute_invocation_async(Invocation::new(Operation::from_async_fn(op)))
            .await
    }

    pub fn execute_invocation(&self, invocation: Invocation<'_, T>) -> PolicyResult<T> {
        let (operation, cancel, payload) = invocation.into_parts();
        let mut result = PolicyResult::new(PolicyKind::Fallback);
        let Some(mut op) = take_sync(operation, result.record_mut()) else {
            return result;
        };
        if !start_canceled(result.record_mut(), &cancel) {
            match op(&cancel) {
                Ok(value) => result.set_ok(value),
                Err(failure) => {
                    if !operation_canceled(result.record_mut(), &failure, &cancel) {
                        let ctx = AttemptContext::new(PolicyKind::Fallback, 0).with_payload(payload);
                        let outcome = self.core.catch_block().handle(
                            result.record_mut(),
                            &failure,
                            &ctx,
                            &cancel,
                            None,
                        );
                        if self.accept(&mut result, failure, outcome, &cancel) {
                            let substituted = self.call_substitute(&cancel);
                            settle_substitute(&mut result, substituted, &cancel);
                        }
                    }
                }
            }
        }
        self.core.finish(result.record_mut(), &cancel);
        result
    }

    pub async fn execute_invocation_async(&self, invocation: Invocation<'_, T>) -> PolicyResult<T> {
        let (operation, cancel, payload) = invocation.into_parts();
        let mut result = PolicyResult::new(PolicyKind::Fallback);
        let Some(mut op) = take_any(operation, result.record_mut()) else {
            return result;
        };
        if !start_canceled(result.record_mut(), &cancel) {
            match op.call_async(&cancel).await {
                Ok(value) => result.set_ok(value),
                Err(failure) => {
                    if !operation_canceled(result.record_mut(), &failure, &cancel) {
                        let ctx = AttemptContext::new(PolicyKind::Fallback, 0).with_payload(payload);
                        let outcome = self
                            .core
                            .catch_block()
                            .handle_async(result.record_mut(), &failure, &ctx, &cancel, None)
                            .await;
                        if self.accept(&mut result, failure, outcome, &cancel) {
                            let substituted = self.call_substitute_async(&cancel).await;
                            settle_substitute(&mut result, substituted, &cancel);
                        }
                    }
                }
            }
        }
        self.core.finish(result.record_mut(), &cancel);
        result
    }

    /// Should the substitute run for this handled failure?
    fn accept(
        &self,
        result: &mut PolicyResult<T>,
        failure: Failure,
        outcome: CatchBlockOutcome,
        cancel: &CancellationToken,
    ) -> bool {
        tracing::debug!(policy = "fallback", error = %failure, ?outcome, "failure handled");
        let record = result.record_mut();
        match outcome {
            CatchBlockOutcome::Canceled => false,
            CatchBlockOutcome::RejectedByPolicy => {
                book_failure(record, failure);
                record.set_failed(FailedReason::PolicyRejected);
                false
            }
            CatchBlockOutcome::Success => {
                if !book_failure(record, failure) {
                    return false;
                }
                if cancel.is_cancelled() {
                    tracing::info!("canceled before the fallback substitute ran");
                    record.set_canceled(canceled_between("before the fallback substitute"));
                    return false;
                }
                true
            }
        }
    }

    fn call_substitute(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        match (&self.sync_substitute, &self.async_substitute) {
            (Some(f), _) => f(cancel),
            (None, Some(f)) => AsyncToSync(Arc::clone(f)).call(cancel),
            (None, None) => Err(no_substitute()),
        }
    }

    async fn call_substitute_async(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        match (&self.async_substitute, &self.sync_substitute) {
            (Some(f), _) => f(cancel.clone()).await,
            (None, Some(f)) => SyncToAsync(Arc::clone(f)).call(cancel).await,
            (None, None) => Err(no_substitute()),
        }
    }
}

fn adapt_async<T, F, Fut>(f: F) -> AsyncSubstitute<T>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
{
    Arc::new(
        move |cancel: CancellationToken| -> BoxFuture<'static, Result<T, Failure>> {
            Box::pin(f(cancel))
        },
    )
}

fn no_substitute() -> Failure {
    Failure::msg("no fallback substitute configured")
}

fn settle_substitute<T>(
    result: &mut PolicyResult<T>,
    substituted: Result<T, Failure>,
    cancel: &CancellationToken,
) {
    let error = match substituted {
        Ok(value) => {
            result.set_ok(value);
            return;
        }
        Err(error) => error,
    };
    let record = result.record_mut();
    match classify_token(cancel, &error) {
        Classification::GenuineCancellation(cause) => {
            tracing::info!(cause = %cause, "fallback substitute canceled");
            record.set_canceled(cause);
        }
        Classification::RegularError => {
            tracing::warn!(error = %error, "fallback substitute failed");
            record.add_catch_block_error(error, CatchBlockSource::Substitute, true);
            record.set_failed(FailedReason::SubstituteFailed);
        }
    }
}
