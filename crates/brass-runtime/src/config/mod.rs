//! Configuration for the Brass runtime.
//!
//! Settings are loaded with [`ConfigLoader`] from layered sources (defaults,
//! config files, `BRASS_*` environment variables) into a [`BrassConfig`]
//! and checked with [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BrassConfig, DispatchConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
    StoreBackend, StoreConfig, TransportConfig,
};
pub use validation::validate_config;
