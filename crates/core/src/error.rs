//! Core error types for CFP resources.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

use crate::resource::ResourceKind;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for resource handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A spec field violates the resource schema.
    #[error("invalid {kind} spec: {field}: {reason}")]
    InvalidSpec {
        kind: ResourceKind,
        field: String,
        reason: String,
    },

    /// A status value could not be parsed.
    #[error("invalid submission status '{value}'")]
    InvalidSubmission { value: String },

    /// Serialization of a resource failed.
    #[error("JSON error: {reason}")]
    Json { reason: String },
}

impl Error {
    /// Create an invalid spec error.
    pub fn invalid_spec(
        kind: ResourceKind,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSpec {
            kind,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid submission error.
    pub fn invalid_submission(value: impl Into<String>) -> Self {
        Self::InvalidSubmission {
            value: value.into(),
        }
    }

    /// Create a JSON error.
    pub fn json(reason: impl Into<String>) -> Self {
        Self::Json {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}
