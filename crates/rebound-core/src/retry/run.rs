//! Retry loop: run the operation until it succeeds, the filter declines its
//! failure, the budget runs out, or the caller cancels.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::policy::RetryPolicy;
use crate::catch_block::CatchBlockOutcome;
use crate::context::{AttemptContext, Payload, PolicyKind};
use crate::failure::Failure;
use crate::operation::{take_any, take_sync, Invocation, Operation};
use crate::policy::{book_failure, canceled_between, operation_canceled, start_canceled};
use crate::result::{FailedReason, PolicyResult, ResultRecord};

/// What the loop does after a failure has been handled.
enum Step {
    Again,
    Stop,
}

impl RetryPolicy {
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
        let mut result = PolicyResult::new(PolicyKind::Retry);
        let Some(mut op) = take_sync(operation, result.record_mut()) else {
            return result;
        };
        if !start_canceled(result.record_mut(), &cancel) {
            let mut attempt = self.budget.start_count();
            loop {
                tracing::debug!(policy = "retry", attempt, "attempt");
                let failure = match op(&cancel) {
                    Ok(value) => {
                        result.set_ok(value);
                        break;
                    }
                    Err(failure) => failure,
                };
                let record = result.record_mut();
                if operation_canceled(record, &failure, &cancel) {
                    break;
                }
                let ctx = self.attempt_context(attempt, &payload);
                let budget = self.budget;
                let eligible = move || budget.can_retry(attempt);
                let outcome =
                    self.core
                        .catch_block()
                        .handle(record, &failure, &ctx, &cancel, Some(&eligible));
                match after_handling(record, failure, outcome, attempt, &cancel) {
                    Step::Again => attempt = attempt.saturating_add(1),
                    Step::Stop => break,
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
        let mut result = PolicyResult::new(PolicyKind::Retry);
        let Some(mut op) = take_any(operation, result.record_mut()) else {
            return result;
        };
        if !start_canceled(result.record_mut(), &cancel) {
            let mut attempt = self.budget.start_count();
            loop {
                tracing::debug!(policy = "retry", attempt, "attempt");
                let failure = match op.call_async(&cancel).await {
                    Ok(value) => {
                        result.set_ok(value);
                        break;
                    }
                    Err(failure) => failure,
                };
                let record = result.record_mut();
                if operation_canceled(record, &failure, &cancel) {
                    break;
                }
                let ctx = self.attempt_context(attempt, &payload);
                let budget = self.budget;
                let eligible = move || budget.can_retry(attempt);
                let outcome = self
                    .core
                    .catch_block()
                    .handle_async(record, &failure, &ctx, &cancel, Some(&eligible))
                    .await;
                match after_handling(record, failure, outcome, attempt, &cancel) {
                    Step::Again => attempt = attempt.saturating_add(1),
                    Step::Stop => break,
                }
            }
        }
        self.core.finish(result.record_mut(), &cancel);
        result
    }

    fn attempt_context(&self, attempt: u32, payload: &Option<Payload>) -> AttemptContext {
        AttemptContext::new(PolicyKind::Retry, attempt).with_payload(payload.clone())
    }
}

fn after_handling(
    record: &mut ResultRecord,
    failure: Failure,
    outcome: CatchBlockOutcome,
    attempt: u32,
    cancel: &CancellationToken,
) -> Step {
    tracing::debug!(policy = "retry", attempt, error = %failure, ?outcome, "failure handled");
    if !book_failure(record, failure) {
        return Step::Stop;
    }
    match outcome {
        CatchBlockOutcome::Success => {
            if cancel.is_cancelled() {
                tracing::info!(attempt, "canceled between attempts");
                record.set_canceled(canceled_between("between attempts"));
                return Step::Stop;
            }
            Step::Again
        }
        CatchBlockOutcome::RejectedByPolicy => {
            tracing::info!(attempt, "retry budget exhausted");
            record.set_failed(FailedReason::PolicyRejected);
            Step::Stop
        }
        CatchBlockOutcome::Canceled => Step::Stop,
    }
}
