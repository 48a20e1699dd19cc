//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A configuration value is invalid.
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl Error {
    /// Create a parse error.
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

impl From<cfp_registry::Error> for Error {
    fn from(err: cfp_registry::Error) -> Self {
        Self::invalid(err.to_string())
    }
}

impl From<cfp_reconciler::Error> for Error {
    fn from(err: cfp_reconciler::Error) -> Self {
        Self::invalid(err.to_string())
    }
}
