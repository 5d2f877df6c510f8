//! The shared decision procedure every policy runs once per caught failure.
//!
//! Steps: evaluate the error filter, check eligibility, run the handler
//! pipeline, disambiguate any cancellation. Only step 3 differs between the
//! sync and async forms; the steps around it are shared functions so both
//! modes classify identically.

use tokio_util::sync::CancellationToken;

use crate::cancel::{classify_token, Canceled, Classification};
use crate::context::AttemptContext;
use crate::failure::Failure;
use crate::filter::ErrorFilter;
use crate::handler::{ErrorPipeline, HandlerStatus, PipelineOutcome};
use crate::result::{CatchBlockSource, ResultRecord};

/// What the owning variant should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchBlockOutcome {
    /// Failure accepted and recorded (or left for the caller when the filter declined it).
    Success,
    /// The caller's own cancel signal stopped processing.
    Canceled,
    /// The failure matched but the eligibility check refused it.
    RejectedByPolicy,
}

/// Extra gate evaluated after the filter, e.g. "retry budget remains".
pub type Eligibility<'a> = &'a (dyn Fn() -> bool + Send + Sync);

/// Filter plus handler pipeline, configured once and shared by every invocation.
#[derive(Debug, Clone, Default)]
pub struct CatchBlock {
    filter: ErrorFilter,
    pipeline: ErrorPipeline,
}

impl CatchBlock {
    pub fn new(filter: ErrorFilter, pipeline: ErrorPipeline) -> Self {
        Self { filter, pipeline }
    }

    pub fn filter(&self) -> &ErrorFilter {
        &self.filter
    }

    pub fn pipeline(&self) -> &ErrorPipeline {
        &self.pipeline
    }

    pub(crate) fn filter_mut(&mut self) -> &mut ErrorFilter {
        &mut self.filter
    }

    pub(crate) fn pipeline_mut(&mut self) -> &mut ErrorPipeline {
        &mut self.pipeline
    }

    /// Run the protocol for `failure`, blocking on handlers.
    pub fn handle(
        &self,
        record: &mut ResultRecord,
        failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
        eligible: Option<Eligibility<'_>>,
    ) -> CatchBlockOutcome {
        if let Some(done) = self.screen(record, failure, eligible) {
            return done;
        }
        let outcome = self.pipeline.process(failure, ctx, cancel);
        settle(record, outcome, cancel)
    }

    /// Async form of [`CatchBlock::handle`].
    pub async fn handle_async(
        &self,
        record: &mut ResultRecord,
        failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
        eligible: Option<Eligibility<'_>>,
    ) -> CatchBlockOutcome {
        if let Some(done) = self.screen(record, failure, eligible) {
            return done;
        }
        let outcome = self.pipeline.process_async(failure, ctx, cancel).await;
        settle(record, outcome, cancel)
    }

    /// Filter and eligibility. `None` means: run the pipeline.
    fn screen(
        &self,
        record: &mut ResultRecord,
        failure: &Failure,
        eligible: Option<Eligibility<'_>>,
    ) -> Option<CatchBlockOutcome> {
        match self.filter.matches(failure) {
            Err(filter_error) => {
                tracing::warn!(error = %filter_error, "error filter raised; leaving failure unprocessed");
                record.add_catch_block_error(filter_error, CatchBlockSource::Filter, false);
                record.set_filter_unsatisfied(failure.clone());
                return Some(CatchBlockOutcome::Success);
            }
            Ok(false) => {
                tracing::debug!(error = %failure, "failure not accepted by error filter");
                record.set_filter_unsatisfied(failure.clone());
                return Some(CatchBlockOutcome::Success);
            }
            Ok(true) => {}
        }

        if let Some(eligible) = eligible {
            if !eligible() {
                return Some(CatchBlockOutcome::RejectedByPolicy);
            }
        }
        None
    }
}

/// Fold handler failures into the record and decide between Success and Canceled.
fn settle(
    record: &mut ResultRecord,
    outcome: PipelineOutcome,
    cancel: &CancellationToken,
) -> CatchBlockOutcome {
    let classification = if outcome.is_canceled() {
        let cause = outcome
            .cancel_cause()
            .cloned()
            .unwrap_or_else(|| Failure::new(Canceled::generic()));
        classify_token(cancel, &cause)
    } else {
        Classification::RegularError
    };
    let genuine = classification.is_genuine();

    for handler_record in outcome.into_records() {
        if handler_record.status == HandlerStatus::Canceled && genuine {
            continue;
        }
        record.add_catch_block_error(
            handler_record.error,
            CatchBlockSource::Handler(handler_record.index),
            false,
        );
    }

    match classification {
        Classification::GenuineCancellation(cause) => {
            tracing::info!(cause = %cause, "canceled while handling failure");
            record.set_canceled(cause);
            CatchBlockOutcome::Canceled
        }
        Classification::RegularError => CatchBlockOutcome::Success,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::context::PolicyKind;
    use crate::handler::HandlerFn;

    fn counting_pipeline(calls: &Arc<AtomicUsize>) -> ErrorPipeline {
        let calls = Arc::clone(calls);
        let mut pipeline = ErrorPipeline::new();
        pipeline.push(Arc::new(HandlerFn::from_fn(move |_f, _c, _t| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));
        pipeline
    }

    fn ctx() -> AttemptContext {
        AttemptContext::new(PolicyKind::Retry, 0)
    }

    #[test]
    fn raising_filter_is_recorded_and_pipeline_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let filter = ErrorFilter::new().try_include_fn(|_| Err(Failure::msg("bad predicate")));
        let cb = CatchBlock::new(filter, counting_pipeline(&calls));
        let mut record = ResultRecord::new(None);
        let failure = Failure::msg("op");

        let out = cb.handle(&mut record, &failure, &ctx(), &CancellationToken::new(), None);
        assert_eq!(out, CatchBlockOutcome::Success);
        assert!(record.error_filter_unsatisfied());
        assert!(record.unprocessed_error().unwrap().same_as(&failure));
        assert_eq!(record.catch_block_errors().len(), 1);
        assert_eq!(record.catch_block_errors()[0].source, CatchBlockSource::Filter);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unmatched_failure_skips_pipeline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let filter = ErrorFilter::new().include::<std::io::Error>();
        let cb = CatchBlock::new(filter, counting_pipeline(&calls));
        let mut record = ResultRecord::new(None);

        let out = cb.handle(
            &mut record,
            &Failure::msg("not io"),
            &ctx(),
            &CancellationToken::new(),
            None,
        );
        assert_eq!(out, CatchBlockOutcome::Success);
        assert!(record.error_filter_unsatisfied());
        assert!(record.catch_block_errors().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ineligible_failure_is_rejected_without_pipeline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cb = CatchBlock::new(ErrorFilter::new(), counting_pipeline(&calls));
        let mut record = ResultRecord::new(None);
        let never = || false;

        let out = cb.handle(
            &mut record,
            &Failure::msg("op"),
            &ctx(),
            &CancellationToken::new(),
            Some(&never),
        );
        assert_eq!(out, CatchBlockOutcome::RejectedByPolicy);
        assert!(!record.error_filter_unsatisfied());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_failures_are_folded_on_success() {
        let mut pipeline = ErrorPipeline::new();
        pipeline.push(Arc::new(HandlerFn::from_fn(|_f, _c, _t| Err(Failure::msg("a")))));
        pipeline.push(Arc::new(HandlerFn::from_fn(|_f, _c, _t| Err(Failure::msg("b")))));
        let cb = CatchBlock::new(ErrorFilter::new(), pipeline);
        let mut record = ResultRecord::new(None);

        let out = cb.handle(&mut record, &Failure::msg("op"), &ctx(), &CancellationToken::new(), None);
        assert_eq!(out, CatchBlockOutcome::Success);
        let sources: Vec<_> = record.catch_block_errors().iter().map(|e| e.source).collect();
        assert_eq!(
            sources,
            vec![CatchBlockSource::Handler(0), CatchBlockSource::Handler(1)]
        );
        assert!(record.catch_block_errors().iter().all(|e| !e.is_critical));
    }

    #[tokio::test]
    async fn cancel_from_handler_yields_canceled_in_both_modes() {
        let mut pipeline = ErrorPipeline::new();
        pipeline.push(Arc::new(HandlerFn::from_fn(|_f, _c, cancel| {
            cancel.cancel();
            Err(Failure::new(Canceled::generic()))
        })));
        let cb = CatchBlock::new(ErrorFilter::new(), pipeline);

        let mut sync_record = ResultRecord::new(None);
        let sync_out = cb.handle(
            &mut sync_record,
            &Failure::msg("op"),
            &ctx(),
            &CancellationToken::new(),
            None,
        );

        let mut async_record = ResultRecord::new(None);
        let async_out = cb
            .handle_async(
                &mut async_record,
                &Failure::msg("op"),
                &ctx(),
                &CancellationToken::new(),
                None,
            )
            .await;

        for (out, record) in [(sync_out, &sync_record), (async_out, &async_record)] {
            assert_eq!(out, CatchBlockOutcome::Canceled);
            assert!(record.is_canceled());
            assert!(record.policy_canceled_error().unwrap().is::<Canceled>());
            assert!(record.catch_block_errors().is_empty());
        }
    }
}
