//! Capability store: conversation state, per-user data and global temp data.
//!
//! The [`Store`] trait is the only cross-task shared mutable resource in a
//! Brass bot. Two backends implement it:
//!
//! | Backend | Module | Expiry |
//! |---------|--------|--------|
//! | [`MemoryStore`] | [`memory`] | lazy, checked on read |
//! | [`RemoteStore`] | [`remote`] | delegated to the KV server (second granularity) |
//!
//! Values cross the store boundary as opaque bytes. Typed access is done by
//! the caller through [`encode`] and [`decode`], so a value of the wrong
//! shape surfaces as [`StoreError::Decode`] rather than being confused with
//! a missing key.
//!
//! # Example
//!
//! ```rust,ignore
//! use brass_core::store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! store.set_state(user, "awaiting_password").await?;
//! assert_eq!(store.get_state(user).await?, "awaiting_password");
//! ```

pub mod memory;
pub mod remote;

#[cfg(feature = "redis")]
pub mod redis_kv;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};
use crate::event::UserId;

pub use memory::MemoryStore;
pub use remote::{KvClient, RemoteStore};

#[cfg(feature = "redis")]
pub use redis_kv::RedisKv;

/// A shared, type-erased store.
pub type BoxedStore = Arc<dyn Store>;

/// Backend for conversation state and cached data.
///
/// Implementations must be safe for concurrent use from many dispatch tasks.
/// Operations for different users never interfere; operations for the same
/// user issued from overlapping events are not ordered beyond what the
/// backend provides.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Sets the conversation state of `user`.
    ///
    /// The empty string is reserved as "no state": setting it clears the
    /// state instead of storing an empty value.
    async fn set_state(&self, user: UserId, state: &str) -> StoreResult<()>;

    /// Returns the conversation state of `user`, or
    /// [`StoreError::NotFound`] when none is set.
    async fn get_state(&self, user: UserId) -> StoreResult<String>;

    /// Clears the conversation state of `user`, keeping its data.
    async fn clear_state(&self, user: UserId) -> StoreResult<()>;

    /// Removes the state and every data key of `user`.
    async fn clear_user(&self, user: UserId) -> StoreResult<()>;

    /// Stores `value` under `key` in the data map of `user`.
    async fn set_data(&self, user: UserId, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Reads `key` from the data map of `user`.
    async fn get_data(&self, user: UserId, key: &str) -> StoreResult<Vec<u8>>;

    /// Removes the given keys from the data map of `user`. Missing keys are
    /// ignored.
    async fn delete_data(&self, user: UserId, keys: &[&str]) -> StoreResult<()>;

    /// Stores a global value that expires after `ttl`.
    async fn set_temp_data(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Reads a global value; expired values are reported as
    /// [`StoreError::NotFound`].
    async fn get_temp_data(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Removes a global value.
    async fn delete_temp_data(&self, key: &str) -> StoreResult<()>;
}

/// Serializes `value` for storage under `key`.
pub fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

/// Deserializes a stored value read from `key`.
pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })
}
