//! # Brass Transport
//!
//! Outbound calls from handlers to external data sources.
//!
//! ```text
//! handler ──► RetryTransport ──► RoundTrip ──► upstream
//!               │  classify status
//!               │  retry with fixed delay
//!               └─ stop on cancellation
//! ```
//!
//! [`RoundTrip`] performs one exchange and is the seam for tests and
//! alternative clients. [`RetryTransport`] adds the retry budget and turns
//! statuses into [`CallError`]s a handler can translate into a reply.
//!
//! ## Features
//!
//! - `http-client`: [`ReqwestRoundTrip`], a `reqwest`-backed [`RoundTrip`].

pub mod call;
pub mod error;
pub mod retry;

#[cfg(feature = "http-client")]
pub mod http;

pub use call::{CallRequest, CallResponse, Method, RoundTrip};
pub use error::{CallError, CallResult, LastFailure, TransportError, TransportResult};
pub use retry::{RetryPolicy, RetryTransport};

#[cfg(feature = "http-client")]
pub use http::ReqwestRoundTrip;
