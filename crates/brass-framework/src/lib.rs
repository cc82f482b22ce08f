//! # Brass Framework
//!
//! Routing layer of the Brass bot runtime.
//!
//! This crate provides:
//! - Path matching for callback data with `:name` parameters ([`path`])
//! - Axum-style handlers with [`FromContext`] extractors ([`handler`])
//! - A tower-based middleware chain ([`middleware`])
//! - The [`Router`] builder with middleware-scoped [`Group`]s, producing an
//!   immutable [`RouteTable`] ([`router`])
//! - The [`Dispatcher`], which resolves one event to one handler, falling
//!   back to the sender's conversation state ([`dispatcher`])
//!
//! ```rust,ignore
//! use brass_framework::*;
//!
//! async fn semester(Param(id): Param<u32>, ctx: Arc<Context>) -> Result<(), BoxError> {
//!     ctx.set_data("semester", &id).await?;
//!     Ok(())
//! }
//!
//! let mut router = Router::new();
//! router.use_middleware(trace()).use_middleware(recover());
//! router.callback_tree("/grades/semester/:semester_id", semester);
//!
//! let dispatcher = Dispatcher::new(router.build()?, store);
//! dispatcher.dispatch(event).await;
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod middleware;
pub mod path;
pub mod router;

pub use context::Context;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{
    BoxError, EventSkipped, ExtractError, ExtractResult, HandlerError, PatternError, RouteError,
};
pub use extractor::{CommandArgs, FromContext, Param, Text};
pub use handler::{
    BoxFuture, BoxedHandlerService, Handler, HandlerResponse, HandlerService, into_service,
};
pub use middleware::{
    Middleware, Next, compose, from_fn, from_layer, panic_message, recover, rule, trace,
};
pub use path::{Params, PathTree, Pattern};
pub use router::{Group, Namespace, ResolvedRoute, RouteTable, Router, Routes};
