//! # Brass
//!
//! A routing runtime for conversational bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────┐     ┌────────────────────────┐
//! │ EventSource │────▶│ BrassRuntime │────▶│ Dispatcher │────▶│ middleware ─▶ handler  │──▶ Store / RetryTransport
//! │  (adapter)  │     │ (task/event) │     │ RouteTable │     │ (tower services)       │
//! └─────────────┘     └──────────────┘     └────────────┘     └────────────────────────┘
//! ```
//!
//! - **Router**: handlers registered per namespace (command, message,
//!   callback, callback tree, state), optionally inside middleware groups
//! - **Dispatcher**: picks at most one route per event, falling back to the
//!   sender's conversation state for messages and callbacks
//! - **Store**: conversation state, per-user data and global temp data,
//!   in memory or in Redis
//! - **RetryTransport**: outbound calls with retries and status classification
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brass::prelude::*;
//!
//! async fn start(ctx: Arc<Context>) -> Result<(), BoxError> {
//!     ctx.set_state("awaiting_login").await?;
//!     Ok(())
//! }
//!
//! async fn login(ctx: Arc<Context>, Text(login): Text) -> Result<(), BoxError> {
//!     ctx.set_data("login", &login).await?;
//!     ctx.clear_state().await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.use_middleware(trace());
//!     router.command("start", start).state("awaiting_login", login);
//!
//!     let runtime = BrassRuntime::builder().build(router).await?;
//!     let (tx, rx) = tokio::sync::mpsc::channel(256);
//!     tokio::spawn(platform_adapter(tx));
//!     runtime.run(rx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)* / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines
//! - `redis`: Redis store backend
//! - `http-client`: reqwest-based [`RoundTrip`](transport::RoundTrip)

pub use brass_core as core;
pub use brass_framework as framework;
pub use brass_runtime as runtime;
pub use brass_transport as transport;

/// Commonly used types for building a bot.
///
/// ```rust,ignore
/// use brass::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use brass_runtime::{BrassConfig, BrassRuntime, EventSource, RuntimeStats};

    // Routing
    pub use brass_framework::{Dispatch, Dispatcher, Namespace, Router, Routes};

    // Handlers and extractors
    pub use brass_framework::{
        BoxError, CommandArgs, Context, FromContext, Param, Params, Text,
    };

    // Middleware
    pub use brass_framework::{Middleware, Next, from_fn, from_layer, recover, rule, trace};

    // Events and storage
    pub use brass_core::{BoxedStore, Event, EventKind, MemoryStore, Store, StoreError, UserId};

    // Outbound calls
    pub use brass_transport::{
        CallError, CallRequest, CallResponse, RetryPolicy, RetryTransport, RoundTrip,
    };
}
