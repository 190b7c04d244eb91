//! Error taxonomy for the work-permit platform.
//!
//! Every service boundary returns [`CoreResult`]. Business rule violations
//! carry a specific, user-facing message; only `Internal` represents an
//! unclassified failure.

use thiserror::Error;

/// Platform errors, grouped by how callers are expected to react.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing, invalid, or expired credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Tenant scope or role violation.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Input shape, enum, range, or referential mismatch.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A state-machine rule was violated.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Unique constraint or concurrent update conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referenced entity absent or outside tenant scope.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// External dependency failed retryably.
    #[error("External dependency unavailable: {0}")]
    ExternalTransient(String),

    /// External dependency rejected the request.
    #[error("External dependency rejected request: {0}")]
    ExternalPermanent(String),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unclassified internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create a not-found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Create an authorization error
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ExternalTransient(_))
    }
}

/// Result type alias for platform operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CoreError::not_found("WorkPermit", "permit_0001");
        assert_eq!(err.to_string(), "WorkPermit not found: permit_0001");
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::ExternalTransient("timeout".into()).is_transient());
        assert!(!CoreError::ExternalPermanent("rejected".into()).is_transient());
        assert!(!CoreError::validation("bad input").is_transient());
    }
}
