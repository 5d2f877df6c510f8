//! Tell a genuine cancellation apart from an error that merely looks like one.

use std::error::Error as StdError;

use tokio_util::sync::CancellationToken;

use super::Canceled;
use crate::failure::{AggregateError, Failure};

/// Result of classifying a raised failure against the outer cancel signal.
#[derive(Debug, Clone)]
pub enum Classification {
    /// The failure is attributable to the caller's own cancel request.
    /// Carries the specific cause (the first cancellation found).
    GenuineCancellation(Failure),
    /// Any other failure, including cancellations from unrelated sources.
    RegularError,
}

impl Classification {
    pub fn is_genuine(&self) -> bool {
        matches!(self, Classification::GenuineCancellation(_))
    }
}

/// True for [`Canceled`] and for canceled tokio tasks.
pub fn is_cancellation_shaped(error: &(dyn StdError + 'static)) -> bool {
    if error.is::<Canceled>() {
        return true;
    }
    error
        .downcast_ref::<tokio::task::JoinError>()
        .is_some_and(|e| e.is_cancelled())
}

fn has_cancellation_in_sources(failure: &Failure) -> bool {
    failure.chain().skip(1).any(is_cancellation_shaped)
}

/// Classify `failure` given whether the outer signal was requested.
///
/// Without an outer request every failure is a regular error, however it is
/// shaped. With one, the failure itself, the leaves of a composite (scanned in
/// order), or a source chain may carry the cancellation. Causes reached only
/// through a borrowed `source()` cannot be re-owned, so a generic marker
/// stands in for them.
pub fn classify(outer_cancel_requested: bool, failure: &Failure) -> Classification {
    if !outer_cancel_requested {
        return Classification::RegularError;
    }
    if is_cancellation_shaped(failure.as_error()) {
        return Classification::GenuineCancellation(failure.clone());
    }

    if let Some(aggregate) = failure.downcast_ref::<AggregateError>() {
        let leaves = aggregate.flatten();
        if let Some(cause) = leaves.iter().find(|f| is_cancellation_shaped(f.as_error())) {
            return Classification::GenuineCancellation(cause.clone());
        }
        if leaves.iter().any(has_cancellation_in_sources) {
            return Classification::GenuineCancellation(Failure::new(Canceled::generic()));
        }
        return Classification::RegularError;
    }

    if has_cancellation_in_sources(failure) {
        return Classification::GenuineCancellation(Failure::new(Canceled::generic()));
    }
    Classification::RegularError
}

/// [`classify`] against the current state of `cancel`.
pub fn classify_token(cancel: &CancellationToken, failure: &Failure) -> Classification {
    classify(cancel.is_cancelled(), failure)
}
