//! # Brass Core
//!
//! Foundation types for the Brass bot routing runtime.
//!
//! This crate provides:
//! - **Event model**: [`Event`], [`EventKind`] and the opaque [`UserId`]
//! - **Capability store**: the [`Store`] trait for conversation state,
//!   per-user data and global temp data, with an in-memory backend
//!   ([`MemoryStore`]) and a networked one ([`RemoteStore`])
//! - **Errors**: [`StoreError`] and its result alias
//!
//! Routing, middleware and the handler system live in `brass-framework`;
//! the dispatch loop and configuration live in `brass-runtime`.
//!
//! ## Feature Flags
//!
//! - `redis`: enables [`RedisKv`](store::RedisKv), a Redis-backed
//!   [`KvClient`](store::KvClient) for [`RemoteStore`].

pub mod error;
pub mod event;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use event::{Event, EventKind, UserId};
pub use store::{BoxedStore, KvClient, MemoryStore, RemoteStore, Store};

#[cfg(feature = "redis")]
pub use store::RedisKv;
