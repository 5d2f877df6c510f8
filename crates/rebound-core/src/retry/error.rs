//! Failures raised by the backoff mechanism itself.

use std::time::Duration;

/// The wait could not be performed at all (as opposed to being canceled).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    /// The deadline `now + delay` is not representable.
    #[error("backoff delay of {0:?} is out of range")]
    OutOfRange(Duration),
    /// An async wait was requested outside a tokio runtime.
    #[error("no async timer available for a {0:?} backoff")]
    NoTimer(Duration),
}
