//! Error types for the Harbor engine.

use crate::OperationId;
use thiserror::Error;

/// All possible errors from the Harbor engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Action errors
    #[error("malformed action '{action}': {reason}")]
    MalformedAction { action: String, reason: String },

    #[error("record is missing an 'id' field")]
    MissingRecordId,

    #[error("record must be a JSON object")]
    NotAnObject,

    // Queue errors
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("operation {id} is {actual}, expected {expected}")]
    InvalidStatus {
        id: OperationId,
        expected: String,
        actual: String,
    },

    // Persistence errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    /// Shorthand for a malformed action error.
    pub fn malformed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAction {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::malformed("entities/upsert", "record is not an object");
        assert_eq!(
            err.to_string(),
            "malformed action 'entities/upsert': record is not an object"
        );

        let err = Error::InvalidStatus {
            id: "op-1".into(),
            expected: "pending".into(),
            actual: "failed".into(),
        };
        assert_eq!(err.to_string(), "operation op-1 is failed, expected pending");
    }
}
