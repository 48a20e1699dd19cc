//! Error types for the reconciler crate.

use cfp_core::ObjectKey;
use cfp_registry::ErrorReason;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// A registry call failed.
    #[error(transparent)]
    Registry(#[from] cfp_registry::Error),

    /// The object store rejected a read or write.
    #[error("store error: {0}")]
    Store(#[from] cfp_store::Error),

    /// The referenced Speaker is missing or has no registry identity yet.
    #[error("unable to get speaker {key}: {reason}")]
    UnresolvedSpeaker { key: ObjectKey, reason: String },

    /// A registry payload could not be encoded.
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an unresolved speaker error.
    pub fn unresolved_speaker(key: ObjectKey, reason: impl Into<String>) -> Self {
        Self::UnresolvedSpeaker {
            key,
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the failed pass should be retried with backoff.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_retryable(),
            Self::Store(cfp_store::Error::Invalid(_)) | Self::InvalidConfig { .. } => false,
            Self::Store(_) | Self::UnresolvedSpeaker { .. } | Self::Serialization { .. } => true,
        }
    }

    /// Registry taxonomy tag, when the failure came from a registry call.
    pub const fn registry_reason(&self) -> Option<ErrorReason> {
        match self {
            Self::Registry(e) => Some(e.reason),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
