//! Error taxonomy for registry calls.
//!
//! Every failure leaving the client carries exactly one [`ErrorReason`].

use std::fmt;

use cfp_core::ResourceKind;
use thiserror::Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Remote operation, used to classify failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Fetch,
    Delete,
}

impl Operation {
    /// HTTP method used for the operation.
    pub const fn method(self) -> &'static str {
        match self {
            Self::Create => "POST",
            Self::Update => "PUT",
            Self::Fetch => "GET",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Fetch => "fetch",
            Self::Delete => "delete",
        })
    }
}

/// Closed set of failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    /// The outgoing request could not be built.
    InvalidRequest,
    /// Transport-level failure.
    RequestFailed,
    CreateSpeakerFailed,
    UpdateSpeakerFailed,
    FetchSpeakerFailed,
    DeleteSpeakerFailed,
    CreateProposalFailed,
    UpdateProposalFailed,
    FetchProposalFailed,
    DeleteProposalFailed,
    Unknown,
}

impl ErrorReason {
    /// Reason for a rejected operation on the given kind.
    pub const fn for_operation(operation: Operation, kind: ResourceKind) -> Self {
        match (operation, kind) {
            (Operation::Create, ResourceKind::Speaker) => Self::CreateSpeakerFailed,
            (Operation::Update, ResourceKind::Speaker) => Self::UpdateSpeakerFailed,
            (Operation::Fetch, ResourceKind::Speaker) => Self::FetchSpeakerFailed,
            (Operation::Delete, ResourceKind::Speaker) => Self::DeleteSpeakerFailed,
            (Operation::Create, ResourceKind::Proposal) => Self::CreateProposalFailed,
            (Operation::Update, ResourceKind::Proposal) => Self::UpdateProposalFailed,
            (Operation::Fetch, ResourceKind::Proposal) => Self::FetchProposalFailed,
            (Operation::Delete, ResourceKind::Proposal) => Self::DeleteProposalFailed,
        }
    }

    /// Stable reason code, used as condition reason.
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::RequestFailed => "RequestFailed",
            Self::CreateSpeakerFailed => "CreateSpeakerFailed",
            Self::UpdateSpeakerFailed => "UpdateSpeakerFailed",
            Self::FetchSpeakerFailed => "FetchSpeakerFailed",
            Self::DeleteSpeakerFailed => "DeleteSpeakerFailed",
            Self::CreateProposalFailed => "CreateProposalFailed",
            Self::UpdateProposalFailed => "UpdateProposalFailed",
            Self::FetchProposalFailed => "FetchProposalFailed",
            Self::DeleteProposalFailed => "DeleteProposalFailed",
            Self::Unknown => "Unknown",
        }
    }

    /// Human summary.
    pub const fn summary(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid request",
            Self::RequestFailed => "request failed",
            Self::CreateSpeakerFailed => "error creating speaker",
            Self::UpdateSpeakerFailed => "error updating speaker",
            Self::FetchSpeakerFailed => "error fetching speaker",
            Self::DeleteSpeakerFailed => "error deleting speaker",
            Self::CreateProposalFailed => "error creating proposal",
            Self::UpdateProposalFailed => "error updating proposal",
            Self::FetchProposalFailed => "error fetching proposal",
            Self::DeleteProposalFailed => "error deleting proposal",
            Self::Unknown => "unknown error",
        }
    }

    /// Operation the reason belongs to, if any.
    pub const fn operation(self) -> Option<Operation> {
        match self {
            Self::CreateSpeakerFailed | Self::CreateProposalFailed => Some(Operation::Create),
            Self::UpdateSpeakerFailed | Self::UpdateProposalFailed => Some(Operation::Update),
            Self::FetchSpeakerFailed | Self::FetchProposalFailed => Some(Operation::Fetch),
            Self::DeleteSpeakerFailed | Self::DeleteProposalFailed => Some(Operation::Delete),
            Self::InvalidRequest | Self::RequestFailed | Self::Unknown => None,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified registry failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", reason.summary())]
pub struct Error {
    pub reason: ErrorReason,
    pub message: String,
    /// HTTP status of the response, when one was received.
    pub status: Option<u16>,
}

impl Error {
    /// Create an error with the given reason.
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            status: None,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::InvalidRequest, message)
    }

    /// Create a transport failure error.
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::RequestFailed, message)
    }

    /// Create an error for a rejected operation.
    pub fn rejected(operation: Operation, kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::new(ErrorReason::for_operation(operation, kind), message)
    }

    /// Attach the HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether retrying the same call can succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.reason, ErrorReason::InvalidRequest)
    }

    /// Whether the registry answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_summary() {
        let err = Error::rejected(Operation::Create, ResourceKind::Speaker, "conflict");
        assert_eq!(err.to_string(), "error creating speaker: conflict");
        assert_eq!(err.reason.code(), "CreateSpeakerFailed");
    }

    #[test]
    fn test_only_invalid_request_is_fatal() {
        assert!(!Error::invalid_request("bad url").is_retryable());
        assert!(Error::request_failed("connection reset").is_retryable());
        assert!(Error::new(ErrorReason::Unknown, "?").is_retryable());
    }

    #[test]
    fn test_not_found_from_status() {
        let err = Error::rejected(Operation::Fetch, ResourceKind::Proposal, "gone").with_status(404);
        assert!(err.is_not_found());
        assert_eq!(err.reason, ErrorReason::FetchProposalFailed);
        assert_eq!(err.reason.operation(), Some(Operation::Fetch));
    }
}
