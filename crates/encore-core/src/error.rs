use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient store/network failure; retrying may succeed.
    Transient,
    /// Authorization failure (acting on a match or favorite set that is not
    /// the caller's). Never retried.
    Auth,
    /// Target entity (profile, match) does not exist.
    NotFound,
    /// Malformed input or stored document.
    Invalid,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the engine boundary.
///
/// Raw store errors never cross this boundary; they are mapped to one of the
/// categories above first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct EngineError {
    /// High-level error category.
    pub category: ErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl EngineError {
    /// Construct a new engine error.
    pub fn new(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Whether a retry loop is allowed to re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.category == ErrorCategory::Transient
    }

    /// Standard rejection for a sender that is not a member of a match.
    pub fn not_a_participant(match_id: &str, sender_id: &str) -> Self {
        Self::new(
            ErrorCategory::Auth,
            "not_a_participant",
            format!("user '{sender_id}' is not a member of match '{match_id}'"),
        )
    }

    /// Standard rejection for an action against a nonexistent match.
    pub fn match_not_found(match_id: &str) -> Self {
        Self::new(
            ErrorCategory::NotFound,
            "match_not_found",
            format!("match not found: {match_id}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        let transient = EngineError::new(ErrorCategory::Transient, "t", "timeout");
        let auth = EngineError::not_a_participant("a_b", "c");
        let missing = EngineError::match_not_found("a_b");

        assert!(transient.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn keeps_participant_rejection_code_stable() {
        let err = EngineError::not_a_participant("a_b", "mallory");
        assert_eq!(err.code, "not_a_participant");
        assert_eq!(err.category, ErrorCategory::Auth);
    }

    #[test]
    fn persists_retry_after_in_millis() {
        let err = EngineError::new(ErrorCategory::Transient, "store_unavailable", "wait")
            .with_retry_after(Duration::from_secs(3));
        assert_eq!(err.retry_after_ms, Some(3000));
    }
}
