//! Cancellation-shaped failures and the disambiguator that decides whether a
//! raised failure belongs to the caller's own cancel signal.
//!
//! One `CancellationToken` is threaded through a whole call: the operation,
//! every handler, and backoff waits all observe the same token.

mod classify;

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::failure::Failure;

pub use classify::{classify, classify_token, is_cancellation_shaped, Classification};

/// Which stage raised the cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelKind {
    /// The wrapped operation (or a handler) observed the signal.
    Operation,
    /// A spawned task was canceled.
    Task,
    /// A backoff wait was interrupted.
    Wait,
}

impl CancelKind {
    fn default_message(self) -> &'static str {
        match self {
            CancelKind::Operation => "the operation was canceled",
            CancelKind::Task => "a task was canceled",
            CancelKind::Wait => "the wait was canceled",
        }
    }
}

/// Failure raised when work stops because of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canceled {
    kind: CancelKind,
    message: Option<String>,
}

impl Canceled {
    pub fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Marker used when a cancellation is certain but no concrete cause can be recovered.
    pub fn generic() -> Self {
        Self::new(CancelKind::Operation)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> CancelKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }
}

impl fmt::Display for Canceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for Canceled {}

/// Returns `Err(Canceled)` once `cancel` has been signaled.
///
/// Intended for use inside operations and handlers: `ensure_not_canceled(&cancel)?;`
pub fn ensure_not_canceled(cancel: &CancellationToken) -> Result<(), Failure> {
    if cancel.is_cancelled() {
        return Err(Failure::new(Canceled::new(CancelKind::Operation)));
    }
    Ok(())
}
