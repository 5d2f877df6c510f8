//! Outcome record built up during one policy invocation.
//!
//! A [`PolicyResult`] is created when an execute call starts, mutated in place
//! by the catch-block protocol and the variant driving it, and handed back to
//! the caller by value. Only this crate mutates it.

mod summary;

use std::fmt;

use serde::Serialize;

use crate::context::PolicyKind;
use crate::failure::Failure;

pub use summary::{CatchBlockSummary, ResultSummary};

/// Why a result ended failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedReason {
    #[default]
    None,
    /// No operation was supplied, or its shape does not fit the entry point.
    NullOperation,
    /// The failure was accepted but the policy refused another attempt.
    PolicyRejected,
    /// The fallback substitute raised.
    SubstituteFailed,
    /// The failure was outside the error filter and surfaced unchanged.
    UnhandledError,
}

/// Where a catch-block failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatchBlockSource {
    /// The error filter predicate raised.
    Filter,
    /// Error handler at this registration index raised.
    Handler(usize),
    /// The fallback substitute raised.
    Substitute,
    /// Result handler at this registration index raised.
    ResultHandler(usize),
}

impl fmt::Display for CatchBlockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatchBlockSource::Filter => write!(f, "filter"),
            CatchBlockSource::Handler(i) => write!(f, "handler[{}]", i),
            CatchBlockSource::Substitute => write!(f, "substitute"),
            CatchBlockSource::ResultHandler(i) => write!(f, "result_handler[{}]", i),
        }
    }
}

/// A failure raised by diagnostic or substitute code rather than the operation.
#[derive(Debug, Clone)]
pub struct CatchBlockError {
    pub error: Failure,
    pub source: CatchBlockSource,
    /// Critical entries are fatal to the invocation (only substitutes produce them).
    pub is_critical: bool,
}

/// Bookkeeping shared by every result regardless of value type.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    policy: Option<PolicyKind>,
    is_failed: bool,
    is_canceled: bool,
    no_error: bool,
    errors: Vec<Failure>,
    catch_block_errors: Vec<CatchBlockError>,
    failed_reason: FailedReason,
    error_filter_unsatisfied: bool,
    unprocessed_error: Option<Failure>,
    policy_canceled_error: Option<Failure>,
}

impl ResultRecord {
    /// Empty record. Policies create their own; this is for callers driving
    /// [`crate::catch_block::CatchBlock`] directly.
    pub fn new(policy: Option<PolicyKind>) -> Self {
        Self {
            policy,
            is_failed: false,
            is_canceled: false,
            no_error: true,
            errors: Vec::new(),
            catch_block_errors: Vec::new(),
            failed_reason: FailedReason::None,
            error_filter_unsatisfied: false,
            unprocessed_error: None,
            policy_canceled_error: None,
        }
    }

    pub fn policy(&self) -> Option<PolicyKind> {
        self.policy
    }

    pub fn is_failed(&self) -> bool {
        self.is_failed
    }

    pub fn is_canceled(&self) -> bool {
        self.is_canceled
    }

    pub fn is_success(&self) -> bool {
        !self.is_failed && !self.is_canceled
    }

    /// True iff the wrapped operation never raised. Independent of `is_failed`.
    pub fn no_error(&self) -> bool {
        self.no_error
    }

    /// Operation failures, one per accepted attempt, in order.
    pub fn errors(&self) -> &[Failure] {
        &self.errors
    }

    pub fn last_error(&self) -> Option<&Failure> {
        self.errors.last()
    }

    pub fn catch_block_errors(&self) -> &[CatchBlockError] {
        &self.catch_block_errors
    }

    pub fn critical_error(&self) -> Option<&CatchBlockError> {
        self.catch_block_errors.iter().find(|e| e.is_critical)
    }

    pub fn failed_reason(&self) -> FailedReason {
        self.failed_reason
    }

    pub fn error_filter_unsatisfied(&self) -> bool {
        self.error_filter_unsatisfied
    }

    pub fn unprocessed_error(&self) -> Option<&Failure> {
        self.unprocessed_error.as_ref()
    }

    pub fn policy_canceled_error(&self) -> Option<&Failure> {
        self.policy_canceled_error.as_ref()
    }

    /// The failure that best explains why this result is not a success.
    pub fn primary_failure(&self) -> Option<Failure> {
        if let Some(e) = &self.policy_canceled_error {
            return Some(e.clone());
        }
        if let Some(e) = self.critical_error() {
            return Some(e.error.clone());
        }
        if let Some(e) = &self.unprocessed_error {
            return Some(e.clone());
        }
        self.errors.last().cloned()
    }

    pub fn summary(&self) -> ResultSummary {
        ResultSummary::from_record(self)
    }

    pub(crate) fn note_raised(&mut self) {
        self.no_error = false;
    }

    pub(crate) fn add_error(&mut self, error: Failure) {
        self.no_error = false;
        self.errors.push(error);
    }

    pub(crate) fn add_catch_block_error(
        &mut self,
        error: Failure,
        source: CatchBlockSource,
        is_critical: bool,
    ) {
        self.catch_block_errors.push(CatchBlockError {
            error,
            source,
            is_critical,
        });
    }

    /// Marks failed; the first recorded reason wins.
    pub(crate) fn set_failed(&mut self, reason: FailedReason) {
        self.is_failed = true;
        if self.failed_reason == FailedReason::None {
            self.failed_reason = reason;
        }
    }

    /// Marks failed without assigning a reason (used by result handlers).
    pub(crate) fn mark_failed(&mut self) {
        self.is_failed = true;
    }

    /// Canceled results are also failed. The first cause recorded is kept.
    pub(crate) fn set_canceled(&mut self, cause: Failure) {
        self.is_canceled = true;
        self.is_failed = true;
        if self.policy_canceled_error.is_none() {
            self.policy_canceled_error = Some(cause);
        }
    }

    pub(crate) fn set_filter_unsatisfied(&mut self, failure: Failure) {
        self.error_filter_unsatisfied = true;
        self.unprocessed_error = Some(failure);
    }
}

/// Outcome of one execute call. `T` is the operation's value type.
#[derive(Debug, Clone)]
pub struct PolicyResult<T = ()> {
    record: ResultRecord,
    result: Option<T>,
}

impl<T> PolicyResult<T> {
    pub(crate) fn new(policy: PolicyKind) -> Self {
        Self {
            record: ResultRecord::new(Some(policy)),
            result: None,
        }
    }

    pub fn record(&self) -> &ResultRecord {
        &self.record
    }

    pub(crate) fn record_mut(&mut self) -> &mut ResultRecord {
        &mut self.record
    }

    /// Value produced by the operation or the substitute; `None` until a success is recorded.
    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    pub fn policy(&self) -> Option<PolicyKind> {
        self.record.policy()
    }

    pub fn is_failed(&self) -> bool {
        self.record.is_failed()
    }

    pub fn is_canceled(&self) -> bool {
        self.record.is_canceled()
    }

    pub fn is_success(&self) -> bool {
        self.record.is_success()
    }

    pub fn no_error(&self) -> bool {
        self.record.no_error()
    }

    pub fn errors(&self) -> &[Failure] {
        self.record.errors()
    }

    pub fn last_error(&self) -> Option<&Failure> {
        self.record.last_error()
    }

    pub fn catch_block_errors(&self) -> &[CatchBlockError] {
        self.record.catch_block_errors()
    }

    pub fn critical_error(&self) -> Option<&CatchBlockError> {
        self.record.critical_error()
    }

    pub fn failed_reason(&self) -> FailedReason {
        self.record.failed_reason()
    }

    pub fn error_filter_unsatisfied(&self) -> bool {
        self.record.error_filter_unsatisfied()
    }

    pub fn unprocessed_error(&self) -> Option<&Failure> {
        self.record.unprocessed_error()
    }

    pub fn policy_canceled_error(&self) -> Option<&Failure> {
        self.record.policy_canceled_error()
    }

    pub fn summary(&self) -> ResultSummary {
        self.record.summary()
    }

    /// Collapse into a plain `Result`, picking the most relevant failure when not a success.
    pub fn into_result(self) -> Result<T, Failure> {
        if !self.record.is_success() {
            return Err(self.record.primary_failure().unwrap_or_else(|| {
                Failure::msg(format!(
                    "policy result failed ({:?})",
                    self.record.failed_reason()
                ))
            }));
        }
        self.result
            .ok_or_else(|| Failure::msg("policy result holds no value"))
    }

    pub(crate) fn set_ok(&mut self, value: T) {
        self.result = Some(value);
    }
}
