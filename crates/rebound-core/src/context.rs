//! Per-attempt context handed to error handlers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Optional caller-supplied value carried to context-aware handlers.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Which policy variant is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Simple,
    Retry,
    Fallback,
}

impl PolicyKind {
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Simple => "simple",
            PolicyKind::Retry => "retry",
            PolicyKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable snapshot: which variant is running and which attempt failed.
#[derive(Clone)]
pub struct AttemptContext {
    policy: PolicyKind,
    attempt: u32,
    payload: Option<Payload>,
}

impl AttemptContext {
    pub fn new(policy: PolicyKind, attempt: u32) -> Self {
        Self {
            policy,
            attempt,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    pub fn policy(&self) -> PolicyKind {
        self.policy
    }

    /// Attempt index of the failed call (0 = first call, offset by any start count).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Typed view of the payload, if one of type `P` was supplied.
    pub fn payload<P: Any + Send + Sync>(&self) -> Option<&P> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<P>())
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

impl fmt::Debug for AttemptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptContext")
            .field("policy", &self.policy)
            .field("attempt", &self.attempt)
            .field("payload", &self.payload.as_ref().map(|_| "<payload>"))
            .finish()
    }
}
