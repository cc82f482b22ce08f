//! Runtime error types.

use thiserror::Error;

use brass_core::StoreError;
use brass_framework::RouteError;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors raised while starting the runtime.
///
/// Once running, the dispatch loop does not fail: per-event errors are
/// logged and counted in [`RuntimeStats`](crate::RuntimeStats).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The router rejected a route.
    #[error("Route table error: {0}")]
    Route(#[from] RouteError),

    /// The configured store could not be opened.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The configuration asks for something this build was compiled without.
    #[error("Feature `{0}` is not enabled in this build")]
    FeatureDisabled(&'static str),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
