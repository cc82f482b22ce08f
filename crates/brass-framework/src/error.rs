//! Error types for the Brass framework.

use thiserror::Error;

pub use tower::BoxError;

/// Returned by a filter predicate when an event does **not** pass a rule.
///
/// The dispatcher recognises this error and reports the event as skipped
/// instead of failed. All other errors are treated as genuine failures.
#[derive(Debug, Clone, Error)]
#[error("event skipped by rule")]
pub struct EventSkipped;

/// Errors that can occur while extracting handler parameters.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The event is not of the class the extractor expects.
    #[error("event kind mismatch: expected {expected}, got {got}")]
    KindMismatch {
        /// Expected event class.
        expected: &'static str,
        /// Actual event class.
        got: &'static str,
    },

    /// A path parameter required by the handler was not captured.
    #[error("missing path parameter '{0}'")]
    MissingParam(String),

    /// A value required by the handler has not been inserted into the
    /// context by any middleware.
    #[error("missing context extension: {0}")]
    MissingExtension(&'static str),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Failures produced by the framework around a handler call.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The handler panicked; the payload message is preserved when it is a
    /// string.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Errors raised while compiling a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A `:` segment without a name.
    #[error("parameter at segment {position} has no name")]
    EmptyParamName {
        /// Zero-based segment index.
        position: usize,
    },

    /// The same parameter name appears twice in one pattern.
    #[error("duplicate parameter name '{0}'")]
    DuplicateParam(String),
}

/// Errors raised when building a route table.
///
/// These are programming errors: a bot is expected to abort startup on them.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// A callback tree pattern failed to compile.
    #[error("invalid callback pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        #[source]
        source: PatternError,
    },
}
