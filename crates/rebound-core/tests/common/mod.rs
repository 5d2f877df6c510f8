//! Shared helpers for the policy integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rebound_core::Failure;

/// A required argument was missing; carries the parameter name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentNull {
    pub param: String,
}

impl ArgumentNull {
    pub fn new(param: &str) -> Self {
        Self {
            param: param.to_string(),
        }
    }
}

impl fmt::Display for ArgumentNull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value cannot be null (parameter '{}')", self.param)
    }
}

impl std::error::Error for ArgumentNull {}

/// Error that wraps another one as its `source()`.
#[derive(Debug)]
pub struct Wrapped {
    pub context: &'static str,
    pub inner: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.context)
    }
}

impl std::error::Error for Wrapped {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Thread-safe call counter that closures can capture by clone.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn arg_null(param: &str) -> Failure {
    Failure::new(ArgumentNull::new(param))
}
