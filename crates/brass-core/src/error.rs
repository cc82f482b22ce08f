//! Error types for the capability store.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// [`NotFound`](StoreError::NotFound) is an ordinary outcome (no state, no
/// data, expired cache entry) and must be kept apart from
/// [`Decode`](StoreError::Decode), which means a value exists but does not
/// have the shape the caller asked for.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The key is not set, or its TTL has elapsed.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded into the requested type.
    #[error("failed to decode value for '{key}': {source}")]
    Decode {
        /// The key whose value failed to decode.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded before storing it.
    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        /// The key being written.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The backend failed (network, protocol, connection pool...).
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a not-found error for the given key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Returns `true` if this error means "key absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this error is a decode failure.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
