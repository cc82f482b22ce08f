//! Error types for outbound calls.

use std::fmt;

use thiserror::Error;

/// A failure below the HTTP status level: the request never produced a
/// response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection, DNS, TLS or body I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// What went wrong on the last attempt of an exhausted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastFailure {
    /// The upstream answered with a retryable status.
    Status(u16),
    /// The request did not produce a response.
    Transport(TransportError),
}

impl fmt::Display for LastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP {status}"),
            Self::Transport(e) => e.fmt(f),
        }
    }
}

/// Terminal outcome of a call through [`RetryTransport`](crate::RetryTransport).
///
/// Handlers match on this to choose what to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The upstream rejected the credentials (HTTP 403). Not retried.
    #[error("credentials rejected by upstream")]
    Forbidden,

    /// The upstream reported itself unavailable (HTTP 503). Not retried.
    #[error("upstream unavailable")]
    Unavailable,

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts, last failure: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last: LastFailure,
    },

    /// The caller cancelled the call between attempts.
    #[error("call cancelled")]
    Cancelled,
}

impl CallError {
    /// Returns `true` for outcomes that a later, identical call could fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Exhausted { .. })
    }
}

/// Result type for a single round trip.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for a resilient call.
pub type CallResult<T> = Result<T, CallError>;
