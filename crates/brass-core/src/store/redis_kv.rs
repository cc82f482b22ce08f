//! Redis implementation of [`KvClient`].
//!
//! ```rust,ignore
//! use brass_core::store::{RedisKv, RemoteStore};
//!
//! let kv = RedisKv::connect("redis://127.0.0.1/").await?;
//! let store = RemoteStore::with_prefix(kv, "grades_bot");
//! ```

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::remote::KvClient;
use crate::error::{StoreError, StoreResult};

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::backend(e.to_string())
}

/// A [`KvClient`] talking to Redis through a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    /// Connects to the Redis server at `url`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = client.get_connection_manager().await.map_err(backend)?;
        info!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }

    /// Wraps an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KvClient for RedisKv {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(backend)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = match ttl_secs {
            Some(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await,
            None => conn.set::<_, _, ()>(key, value).await,
        }
        .map_err(backend)?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await.map_err(backend)?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.hget(key, field).await.map_err(backend)?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await.map_err(backend)?;
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(key, fields).await.map_err(backend)?;
        Ok(())
    }
}
