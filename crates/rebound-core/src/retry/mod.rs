//! Retry policy, retry budget and backoff.
//!
//! The budget decides whether another attempt may follow a failure; the
//! delay strategy decides how long to wait before it. Waits go through the
//! safe-backoff helpers so a cancel request or a broken timer is reported
//! instead of propagated.

mod backoff;
mod budget;
mod delay;
mod error;
mod policy;
mod run;

pub use backoff::{wait_async, wait_blocking, BackoffOutcome, DelayHandler, WAIT_SLICE};
pub use budget::{RetryBudget, INFINITE_RETRY_THRESHOLD};
pub use delay::{ConstantDelay, DelayStrategy, ExponentialDelay, LinearDelay};
pub use error::BackoffError;
pub use policy::RetryPolicy;
