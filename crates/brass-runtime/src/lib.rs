//! Brass Runtime - the dispatch loop and its surroundings.
//!
//! This crate provides:
//! - The dispatch loop ([`BrassRuntime`]) fed by an [`EventSource`]
//! - Layered configuration ([`ConfigLoader`], [`BrassConfig`])
//! - Logging setup ([`LoggingBuilder`])
//! - Store construction from the `[store]` section
//!
//! ```ignore
//! use brass_runtime::BrassRuntime;
//! use brass_framework::{Router, Routes};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.command("start", start);
//!
//!     let runtime = BrassRuntime::builder().build(router).await?;
//!     let (tx, rx) = tokio::sync::mpsc::channel(256);
//!     tokio::spawn(platform_adapter(tx));
//!
//!     runtime.run(rx).await;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log format
//! - `redis`: the `redis` store backend
//! - `http-client`: the reqwest-based round-tripper in `brass-transport`

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod source;

pub use config::{BrassConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BrassRuntime, RuntimeBuilder, RuntimeStats};
pub use source::EventSource;

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
