//! Error types for the store crate.

use cfp_core::{ObjectKey, ResourceKind};
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Object does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    /// Object already exists.
    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    /// Spec rejected by schema validation.
    #[error("validation failed: {0}")]
    Invalid(#[from] cfp_core::Error),

    /// Index was never registered.
    #[error("index '{index}' is not registered")]
    UnknownIndex { index: String },

    /// Watch receiver fell behind and missed events.
    #[error("watch lagged, {skipped} events skipped")]
    WatchLagged { skipped: u64 },

    /// Watch channel closed.
    #[error("watch channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a not found error.
    pub const fn not_found(kind: ResourceKind, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }

    /// Create an already exists error.
    pub const fn already_exists(kind: ResourceKind, key: ObjectKey) -> Self {
        Self::AlreadyExists { kind, key }
    }

    /// Create an unknown index error.
    pub fn unknown_index(index: impl Into<String>) -> Self {
        Self::UnknownIndex {
            index: index.into(),
        }
    }

    /// Whether this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
