//! Error types for the Clodo API client.
//!
//! # Design
//! Every public operation returns a single `Error` so callers can match on
//! the failure kind instead of parsing messages. Local precondition failures
//! (`Configuration`, `Validation`) are raised before any network traffic;
//! `Transport` and `Remote` come out of the dispatcher. Nothing here is
//! retried: the caller owns any retry or re-login policy.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Remote failures the API documents, keyed by HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 400: the request was malformed.
    BadRequest,
    /// 401: bad credentials or an expired session token.
    Unauthorized,
    /// 404: the resource does not exist.
    NotFound,
    /// 405: the function is temporarily disabled on the remote side.
    MethodUnavailable,
    /// 500: the remote failed internally.
    InternalError,
}

impl RemoteErrorKind {
    /// Classify a status code. Returns `None` for every status the API treats
    /// as success, which includes anything not explicitly mapped.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorized),
            404 => Some(Self::NotFound),
            405 => Some(Self::MethodUnavailable),
            500 => Some(Self::InternalError),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "authorization failed, invalid credentials or token",
            Self::NotFound => "not found",
            Self::MethodUnavailable => "the function is temporarily unavailable",
            Self::InternalError => "internal error",
        }
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by `ClodoClient`.
#[derive(Debug, Error)]
pub enum Error {
    /// The client was constructed with an unsupported setting, e.g. a
    /// response format other than `xml` or `json`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied parameter failed a local check. No request was sent.
    #[error("{operation}: invalid input: {reason}")]
    Validation {
        operation: &'static str,
        reason: String,
    },

    /// The connection could not be completed (DNS, TLS, reset, ...).
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote answered with one of the mapped failure statuses.
    #[error("remote error {status}: {kind}")]
    Remote { status: u16, kind: RemoteErrorKind },

    /// The login response lacked a header needed to build a session.
    #[error("login response is missing the {header} header")]
    IncompleteSession { header: &'static str },

    /// A request body could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn validation(operation: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            operation,
            reason: reason.into(),
        }
    }

    /// The remote status code, when the failure came from the remote side.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a 401, the cue to log in again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Error::Remote {
                kind: RemoteErrorKind::Unauthorized,
                ..
            }
        )
    }
}
