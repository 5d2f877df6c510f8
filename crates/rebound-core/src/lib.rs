//! Rebound core: run an operation under a retry, fallback or no-retry policy,
//! pass every caught failure through an ordered handler pipeline, and tell a
//! caller's own cancellation apart from ordinary errors.

pub mod config;
pub mod logging;

pub mod cancel;
pub mod catch_block;
pub mod context;
pub mod failure;
pub mod filter;
pub mod handler;
pub mod operation;
pub mod policy;
pub mod result;
pub mod retry;

pub use cancel::{CancelKind, Canceled, Classification};
pub use catch_block::{CatchBlock, CatchBlockOutcome};
pub use context::{AttemptContext, PolicyKind};
pub use failure::{AggregateError, Failure};
pub use filter::ErrorFilter;
pub use handler::{ErrorHandler, ErrorPipeline, HandlerFn};
pub use operation::{Invocation, Operation};
pub use policy::{ConfigurePolicy, FallbackPolicy, ResultVerdict, SimplePolicy};
pub use result::{CatchBlockSource, FailedReason, PolicyResult, ResultRecord};
pub use retry::{DelayStrategy, RetryBudget, RetryPolicy};

/// Cancellation signal threaded through every call.
pub use tokio_util::sync::CancellationToken;
