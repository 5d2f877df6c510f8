//! Run once; record the failure and stop.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::{book_failure, operation_canceled, start_canceled, ConfigurePolicy, PolicyCore};
use crate::catch_block::CatchBlockOutcome;
use crate::context::{AttemptContext, Payload, PolicyKind};
use crate::failure::Failure;
use crate::operation::{take_any, take_sync, Invocation, Operation};
use crate::result::{FailedReason, PolicyResult, ResultRecord};

/// Runs the operation once. A caught failure is handled and recorded, and the
/// result is not marked failed unless the filter declined it.
#[derive(Debug, Clone, Default)]
pub struct SimplePolicy {
    core: PolicyCore,
}

impl ConfigurePolicy for SimplePolicy {
    fn core_mut(&mut self) -> &mut PolicyCore {
        &mut self.core
    }
}

impl SimplePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn core(&self) -> &PolicyCore {
        &self.core
    }

    pub fn execute<T, F>(&self, op: F) -> PolicyResult<T>
    where
        F: FnMut(&CancellationToken) -> Result<T, Failure> + Send,
    {
        self.execute_invocation(Invocation::new(Operation::from_fn(op)))
    }

    pub async fn execute_async<T, F, Fut>(&self, op: F) -> PolicyResult<T>
    where
        F: FnMut(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, Failure>> + Send,
    {
        self.execute_invocation_async(Invocation::new(Operation::from_async_fn(op)))
            .await
    }

    pub fn execute_invocation<T>(&self, invocation: Invocation<'_, T>) -> PolicyResult<T> {
        let (operation, cancel, payload) = invocation.into_parts();
        let mut result = PolicyResult::new(PolicyKind::Simple);
        let Some(mut op) = take_sync(operation, result.record_mut()) else {
            return result;
        };
        if !start_canceled(result.record_mut(), &cancel) {
            match op(&cancel) {
                Ok(value) => result.set_ok(value),
                Err(failure) => {
                    let record = result.record_mut();
                    if !operation_canceled(record, &failure, &cancel) {
                        let ctx = attempt_context(payload);
                        let outcome =
                            self.core
                                .catch_block()
                                .handle(record, &failure, &ctx, &cancel, None);
                        conclude(record, failure, outcome);
                    }
                }
            }
        }
        self.core.finish(result.record_mut(), &cancel);
        result
    }

    pub async fn execute_invocation_async<T>(
        &self,
        invocation: Invocation<'_, T>,
    ) -> PolicyResult<T> {
        let (operation, cancel, payload) = invocation.into_parts();
        let mut result = PolicyResult::new(PolicyKind::Simple);
        let Some(mut op) = take_any(operation, result.record_mut()) else {
            return result;
        };
        if !start_canceled(result.record_mut(), &cancel) {
            match op.call_async(&cancel).await {
                Ok(value) => result.set_ok(value),
                Err(failure) => {
                    let record = result.record_mut();
                    if !operation_canceled(record, &failure, &cancel) {
                        let ctx = attempt_context(payload);
                        let outcome = self
                            .core
                            .catch_block()
                            .handle_async(record, &failure, &ctx, &cancel, None)
                            .await;
                        conclude(record, failure, outcome);
                    }
                }
            }
        }
        self.core.finish(result.record_mut(), &cancel);
        result
    }
}

fn attempt_context(payload: Option<Payload>) -> AttemptContext {
    AttemptContext::new(PolicyKind::Simple, 0).with_payload(payload)
}

fn conclude(record: &mut ResultRecord, failure: Failure, outcome: CatchBlockOutcome) {
    tracing::debug!(policy = "simple", error = %failure, ?outcome, "failure handled");
    if !book_failure(record, failure) {
        return;
    }
    if outcome == CatchBlockOutcome::RejectedByPolicy {
        record.set_failed(FailedReason::PolicyRejected);
    }
}
