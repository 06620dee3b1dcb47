//! Error taxonomy for the request lifecycle.
//!
//! # Design Decisions
//! - Every stage normalizes its failure into one `RequestError` variant
//!   before it reaches the state machine
//! - Retry-or-finalize is decided from `ErrorKind` plus the retrier's answer
//! - Underlying causes are kept behind `Arc` so errors can be recorded on a
//!   request and delivered later

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::codec::DecodeError;
use crate::request::validation::ValidationFailure;

/// Boxed error used for causes coming from user-supplied policies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a `RequestError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    Adaptation,
    Encoding,
    Transport,
    TrustEvaluation,
    Validation,
    Decoding,
    SessionInvalidated,
    Cancelled,
}

impl ErrorKind {
    /// Fatal kinds never reach the retrier.
    pub fn is_fatal(self) -> bool {
        !self.is_retry_eligible()
    }

    /// Kinds the retrier is consulted for.
    pub fn is_retry_eligible(self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::Validation | ErrorKind::TrustEvaluation
        )
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::Adaptation => "adaptation",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Transport => "transport",
            ErrorKind::TrustEvaluation => "trust_evaluation",
            ErrorKind::Validation => "validation",
            ErrorKind::Decoding => "decoding",
            ErrorKind::SessionInvalidated => "session_invalidated",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low-level failure reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    TimedOut,
    ConnectionFailed,
    Cancelled,
    TooManyRedirects,
    InvalidRequest,
    /// Cache-only load found nothing to serve.
    ResourceUnavailable,
    Other,
}

/// Error reported by the transport layer for one task.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::new(TransportErrorKind::TimedOut, "the request timed out")
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "the task was cancelled")
    }
}

/// The single terminal error delivered to a request's caller.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The descriptor's target could not be resolved to a well-formed URL.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// An adapter in the interceptor chain failed.
    #[error("request adaptation failed: {0}")]
    Adaptation(Arc<BoxError>),

    /// Parameter encoding failed.
    #[error("parameter encoding failed: {0}")]
    Encoding(String),

    /// Connection, timeout or other transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server's identity was rejected.
    #[error("server trust evaluation failed for {host}: {reason}")]
    TrustEvaluation { host: String, reason: String },

    /// The descriptor or response failed acceptance criteria.
    #[error("validation failed: {0}")]
    Validation(ValidationFailure),

    /// The response body could not be decoded.
    #[error("response decoding failed: {0}")]
    Decoding(#[from] DecodeError),

    /// The owning session was torn down while the request was in flight.
    #[error("session invalidated")]
    SessionInvalidated,

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            RequestError::Adaptation(_) => ErrorKind::Adaptation,
            RequestError::Encoding(_) => ErrorKind::Encoding,
            RequestError::Transport(_) => ErrorKind::Transport,
            RequestError::TrustEvaluation { .. } => ErrorKind::TrustEvaluation,
            RequestError::Validation(_) => ErrorKind::Validation,
            RequestError::Decoding(_) => ErrorKind::Decoding,
            RequestError::SessionInvalidated => ErrorKind::SessionInvalidated,
            RequestError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn adaptation(cause: impl Into<BoxError>) -> Self {
        RequestError::Adaptation(Arc::new(cause.into()))
    }

    /// Transport error details, if this is a transport failure.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            RequestError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationFailure> for RequestError {
    fn from(failure: ValidationFailure) -> Self {
        RequestError::Validation(failure)
    }
}

/// Errors raised while constructing a `Session`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sessions spawn their lifecycle work on the ambient Tokio runtime.
    #[error("a session must be built inside a Tokio runtime")]
    NoRuntime,

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::loader::ConfigError),
}
