//! Serializable snapshot of a result, for logs and `--json` output.

use serde::Serialize;

use super::{FailedReason, ResultRecord};
use crate::context::PolicyKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatchBlockSummary {
    pub source: String,
    pub critical: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub policy: Option<PolicyKind>,
    pub is_success: bool,
    pub is_failed: bool,
    pub is_canceled: bool,
    pub no_error: bool,
    pub failed_reason: FailedReason,
    pub errors: Vec<String>,
    pub catch_block_errors: Vec<CatchBlockSummary>,
    pub error_filter_unsatisfied: bool,
    pub unprocessed_error: Option<String>,
    pub policy_canceled_error: Option<String>,
}

impl ResultSummary {
    pub(super) fn from_record(record: &ResultRecord) -> Self {
        Self {
            policy: record.policy(),
            is_success: record.is_success(),
            is_failed: record.is_failed(),
            is_canceled: record.is_canceled(),
            no_error: record.no_error(),
            failed_reason: record.failed_reason(),
            errors: record.errors().iter().map(|e| e.to_string()).collect(),
            catch_block_errors: record
                .catch_block_errors()
                .iter()
                .map(|e| CatchBlockSummary {
                    source: e.source.to_string(),
                    critical: e.is_critical,
                    message: e.error.to_string(),
                })
                .collect(),
            error_filter_unsatisfied: record.error_filter_unsatisfied(),
            unprocessed_error: record.unprocessed_error().map(|e| e.to_string()),
            policy_canceled_error: record.policy_canceled_error().map(|e| e.to_string()),
        }
    }
}
