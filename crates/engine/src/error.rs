// Engine error taxonomy.
//
// Every failure in the core maps to one of four conditions. All are
// recoverable at the session level: the caller keeps its local buffer
// and may retry or reopen the document.

use coscribe_common::types::Role;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Document or record absent, or hidden from a caller without read
    /// capability.
    #[error("document {doc_id} not found")]
    NotFound { doc_id: Uuid },

    /// Caller's workspace role does not satisfy the operation.
    #[error("operation requires the {} role", .required.as_str())]
    PermissionDenied { required: Role },

    /// Backing store temporarily unreachable. Retryable; swallowed with a
    /// warning on presence paths, surfaced on content paths.
    #[error("backing store temporarily unavailable: {reason}")]
    TransientUnavailable { reason: String },

    /// Malformed input, e.g. an empty or duplicate filename.
    #[error("{0}")]
    Validation(String),
}

impl EngineError {
    pub fn not_found(doc_id: Uuid) -> Self {
        Self::NotFound { doc_id }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::TransientUnavailable { reason: reason.into() }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::TransientUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(EngineError::unavailable("connection reset").retryable());
        assert!(!EngineError::not_found(Uuid::new_v4()).retryable());
        assert!(!EngineError::PermissionDenied { required: Role::Editor }.retryable());
        assert!(!EngineError::Validation("empty filename".into()).retryable());
    }

    #[test]
    fn permission_denied_names_the_required_role() {
        let error = EngineError::PermissionDenied { required: Role::Owner };
        assert_eq!(error.to_string(), "operation requires the owner role");
    }
}
