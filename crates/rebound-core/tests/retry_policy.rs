//! Retry policy against real operations: budgets, filters, handlers and both execution modes.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{arg_null, ArgumentNull, Counter};
use rebound_core::retry::ConstantDelay;
use rebound_core::{
    CancellationToken, Canceled, CatchBlockSource, ConfigurePolicy, ErrorFilter, FailedReason,
    Failure, Invocation, Operation, PolicyKind, PolicyResult, RetryPolicy,
};

fn always_failing(calls: &Counter) -> impl FnMut(&CancellationToken) -> Result<(), Failure> + Send {
    let calls = calls.clone();
    move |_cancel| {
        calls.bump();
        Err(Failure::msg("service unavailable"))
    }
}

#[test]
fn bound_of_n_records_n_plus_one_failures() {
    for retries in [1, 3, 5] {
        let calls = Counter::new();
        let r = RetryPolicy::new(retries).execute(always_failing(&calls));
        let expected = retries as usize + 1;
        assert_eq!(calls.get(), expected, "retries = {}", retries);
        assert_eq!(r.errors().len(), expected);
        assert!(r.is_failed());
        assert!(!r.is_canceled());
        assert!(!r.no_error());
        assert_eq!(r.failed_reason(), FailedReason::PolicyRejected);
        assert_eq!(r.policy(), Some(PolicyKind::Retry));
    }
}

#[test]
fn zero_and_negative_budgets_behave_like_one() {
    for retries in [0, -5] {
        let calls = Counter::new();
        let r = RetryPolicy::new(retries).execute(always_failing(&calls));
        assert_eq!(calls.get(), 2);
        assert_eq!(r.errors().len(), 2);
        assert!(r.is_failed());
    }
}

#[test]
fn infinite_policy_runs_until_success() {
    let calls = Counter::new();
    let c = calls.clone();
    let r = RetryPolicy::infinite().execute(move |_cancel| {
        if c.bump() < 50 {
            Err(Failure::msg("not yet"))
        } else {
            Ok(50)
        }
    });
    assert!(r.is_success());
    assert_eq!(r.result(), Some(&50));
    assert_eq!(r.errors().len(), 49);
}

#[test]
fn failure_outside_filter_is_not_retried() {
    let calls = Counter::new();
    let c = calls.clone();
    let handled = Counter::new();
    let h = handled.clone();
    let policy = RetryPolicy::new(5)
        .include_error_where::<ArgumentNull, _>(|e| e.param == "Test")
        .handle_error(move |_f, _ctx, _cancel| {
            h.bump();
            Ok(())
        });

    let r: PolicyResult<()> = policy.execute(move |_cancel| {
        c.bump();
        Err(arg_null("Test2"))
    });

    assert_eq!(calls.get(), 1);
    assert_eq!(handled.get(), 0);
    assert!(r.error_filter_unsatisfied());
    assert!(r.is_failed());
    assert_eq!(r.failed_reason(), FailedReason::UnhandledError);
    assert!(r.errors().is_empty());
    assert!(!r.no_error());
    let unprocessed = r.unprocessed_error().unwrap();
    assert_eq!(unprocessed.downcast_ref::<ArgumentNull>(), Some(&ArgumentNull::new("Test2")));
}

#[test]
fn matching_failure_is_retried() {
    let calls = Counter::new();
    let c = calls.clone();
    let policy = RetryPolicy::new(2).include_error_where::<ArgumentNull, _>(|e| e.param == "Test");
    let r: PolicyResult<()> = policy.execute(move |_cancel| {
        c.bump();
        Err(arg_null("Test"))
    });
    assert_eq!(calls.get(), 3);
    assert!(!r.error_filter_unsatisfied());
    assert_eq!(r.errors().len(), 3);
}

#[test]
fn raising_filter_leaves_failure_unprocessed() {
    let calls = Counter::new();
    let policy = RetryPolicy::new(3).with_filter(
        ErrorFilter::new().try_include_fn(|_f| Err(Failure::msg("predicate crashed"))),
    );
    let r = policy.execute(always_failing(&calls));

    assert_eq!(calls.get(), 1);
    assert!(r.error_filter_unsatisfied());
    assert!(r.unprocessed_error().is_some());
    assert_eq!(r.catch_block_errors().len(), 1);
    assert_eq!(r.catch_block_errors()[0].source, CatchBlockSource::Filter);
    assert!(!r.catch_block_errors()[0].is_critical);
    assert_eq!(r.failed_reason(), FailedReason::UnhandledError);
}

#[test]
fn handler_that_cancels_stops_after_one_failure() {
    let cancel = CancellationToken::new();
    let calls = Counter::new();
    let policy = RetryPolicy::new(1).handle_error(|_f, _ctx, cancel| {
        cancel.cancel();
        Err(Failure::new(Canceled::generic()))
    });

    let r = policy.execute_invocation(
        Invocation::new(Operation::from_fn(always_failing(&calls))).with_cancel(cancel.clone()),
    );

    assert_eq!(calls.get(), 1);
    assert!(r.is_failed());
    assert!(r.is_canceled());
    assert_eq!(r.errors().len(), 1);
    assert!(r.policy_canceled_error().unwrap().is::<Canceled>());
    assert!(r.catch_block_errors().is_empty());
}

#[test]
fn cancel_observed_between_attempts_stops_the_loop() {
    let cancel = CancellationToken::new();
    let calls = Counter::new();
    let policy = RetryPolicy::new(10).handle_error(|_f, _ctx, cancel| {
        cancel.cancel();
        Ok(())
    });
    let r = policy.execute_invocation(
        Invocation::new(Operation::from_fn(always_failing(&calls))).with_cancel(cancel),
    );
    assert_eq!(calls.get(), 1);
    assert!(r.is_canceled());
    assert_eq!(r.errors().len(), 1);
}

#[test]
fn handler_failures_are_isolated_and_recorded() {
    let calls = Counter::new();
    let second = Counter::new();
    let s = second.clone();
    let policy = RetryPolicy::new(2)
        .handle_error(|_f, _ctx, _cancel| Err(Failure::msg("metrics sink down")))
        .handle_error(move |_f, _ctx, _cancel| {
            s.bump();
            Ok(())
        });
    let r = policy.execute(always_failing(&calls));

    assert_eq!(calls.get(), 3);
    // The final failure is rejected by the budget before handlers run.
    assert_eq!(second.get(), 2);
    assert_eq!(r.catch_block_errors().len(), 2);
    assert!(r
        .catch_block_errors()
        .iter()
        .all(|e| e.source == CatchBlockSource::Handler(0) && !e.is_critical));
    assert_eq!(r.failed_reason(), FailedReason::PolicyRejected);
}

#[test]
fn payload_reaches_handlers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let policy = RetryPolicy::new(1).handle_error(move |_f, ctx, _cancel| {
        let request = ctx.payload::<String>().cloned().unwrap_or_default();
        s.lock().unwrap().push((ctx.attempt(), request));
        Ok(())
    });
    let calls = Counter::new();
    let _ = policy.execute_invocation(
        Invocation::new(Operation::from_fn(always_failing(&calls))).with_payload("req-42".to_string()),
    );
    assert_eq!(*seen.lock().unwrap(), vec![(0, "req-42".to_string())]);
}

#[test]
fn missing_operation_is_classified_without_running() {
    let handled = Counter::new();
    let h = handled.clone();
    let policy = RetryPolicy::new(3).handle_error(move |_f, _ctx, _cancel| {
        h.bump();
        Ok(())
    });
    let r: PolicyResult<u8> = policy.execute_invocation(Invocation::missing());
    assert!(r.is_failed());
    assert!(r.no_error());
    assert_eq!(r.failed_reason(), FailedReason::NullOperation);
    assert_eq!(handled.get(), 0);
}

#[test]
fn async_operation_from_sync_entry_point_is_not_run() {
    let calls = Counter::new();
    let c = calls.clone();
    let op = Operation::from_async_fn(move |_cancel| {
        let c = c.clone();
        async move {
            c.bump();
            Ok::<_, Failure>(())
        }
    });
    let r = RetryPolicy::new(1).execute_invocation(Invocation::new(op));
    assert_eq!(calls.get(), 0);
    assert_eq!(r.failed_reason(), FailedReason::NullOperation);
}

#[tokio::test]
async fn async_mode_matches_sync_mode() {
    let sync_calls = Counter::new();
    let sync = RetryPolicy::new(3)
        .handle_error(|_f, _ctx, _cancel| Err(Failure::msg("audit down")))
        .execute(always_failing(&sync_calls));

    let async_calls = Counter::new();
    let c = async_calls.clone();
    let policy = RetryPolicy::new(3).handle_error_async(|_f, _ctx, _cancel| async {
        Err(Failure::msg("audit down"))
    });
    let asynchronous: PolicyResult<()> = policy
        .execute_async(move |_cancel| {
            let c = c.clone();
            async move {
                c.bump();
                Err(Failure::msg("service unavailable"))
            }
        })
        .await;

    assert_eq!(sync_calls.get(), async_calls.get());
    assert_eq!(sync.summary(), asynchronous.summary());
}

#[tokio::test]
async fn sync_operation_from_async_entry_point_runs_inline() {
    let calls = Counter::new();
    let r = RetryPolicy::new(2)
        .execute_invocation_async(Invocation::new(Operation::from_fn(always_failing(&calls))))
        .await;
    assert_eq!(calls.get(), 3);
    assert_eq!(r.errors().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn delay_runs_after_earlier_handlers() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let before = Arc::clone(&order);
    let after = Arc::clone(&order);
    let policy = RetryPolicy::new(1)
        .handle_error(move |_f, _ctx, _cancel| {
            before.lock().unwrap().push(("before", tokio::time::Instant::now()));
            Ok(())
        })
        .with_delay(Arc::new(ConstantDelay::new(Duration::from_secs(2))))
        .handle_error(move |_f, _ctx, _cancel| {
            after.lock().unwrap().push(("after", tokio::time::Instant::now()));
            Ok(())
        });
    let _: PolicyResult<()> = policy
        .execute_async(|_cancel| async { Err(Failure::msg("down")) })
        .await;

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 2);
    assert_eq!(order[0].0, "before");
    assert_eq!(order[1].0, "after");
    assert!(order[1].1 - order[0].1 >= Duration::from_secs(2));
}

#[test]
fn async_handler_with_timer_runs_from_plain_thread() {
    let calls = Counter::new();
    let handled = Counter::new();
    let h = handled.clone();
    let policy = RetryPolicy::new(2).handle_error_async(move |_f, _ctx, _cancel| {
        let h = h.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            h.bump();
            Ok(())
        }
    });
    let r = policy.execute(always_failing(&calls));
    assert_eq!(calls.get(), 3);
    assert_eq!(handled.get(), 2);
    assert!(r.catch_block_errors().is_empty());
    assert_eq!(r.failed_reason(), FailedReason::PolicyRejected);
}
