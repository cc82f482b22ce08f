//! Networked store over a key-value server with expiry.
//!
//! [`RemoteStore`] maps the [`Store`] contract onto a handful of primitive
//! commands described by [`KvClient`]. The key layout is:
//!
//! | Purpose | Key | Type |
//! |---------|-----|------|
//! | conversation state | `{prefix}:state:{user}` | string |
//! | keyed data | `{prefix}:data:{user}` | hash, one field per data key |
//! | temp data | `{prefix}:temp:{key}` | string with expiry |
//!
//! User ids are numeric and temp keys live under their own segment, so keys
//! never collide across users or purposes.
//!
//! TTLs are sent with second granularity, rounded up. Expiry is enforced by
//! the server, so an expired entry simply reads back as absent.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::Store;
use crate::error::{StoreError, StoreResult};
use crate::event::UserId;

/// Default namespace prepended to every key.
pub const DEFAULT_KEY_PREFIX: &str = "brass";

/// Primitive commands a networked key-value backend must provide.
///
/// Missing keys and fields are reported as `Ok(None)`, never as errors.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// Reads a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes a string value, expiring after `ttl_secs` when given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> StoreResult<()>;

    /// Deletes keys of any type.
    async fn del(&self, keys: &[String]) -> StoreResult<()>;

    /// Reads one field of a hash.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes one field of a hash.
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Deletes fields of a hash.
    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<()>;
}

/// A [`Store`] persisted in a networked key-value server.
pub struct RemoteStore<C> {
    client: C,
    prefix: String,
}

impl<C: KvClient> RemoteStore<C> {
    /// Creates a store using [`DEFAULT_KEY_PREFIX`].
    pub fn new(client: C) -> Self {
        Self::with_prefix(client, DEFAULT_KEY_PREFIX)
    }

    /// Creates a store whose keys all start with `prefix`.
    pub fn with_prefix(client: C, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn state_key(&self, user: UserId) -> String {
        format!("{}:state:{user}", self.prefix)
    }

    fn data_key(&self, user: UserId) -> String {
        format!("{}:data:{user}", self.prefix)
    }

    fn temp_key(&self, key: &str) -> String {
        format!("{}:temp:{key}", self.prefix)
    }
}

/// Longest expiry sent to the backend (100 years). Redis rejects expiry
/// times that overflow its millisecond clock.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Converts a TTL to whole seconds, rounding up and capping at
/// [`MAX_TTL_SECS`].
///
/// Returns `None` for a zero TTL, which stores nothing.
pub fn ttl_secs(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    let secs = ttl.as_secs();
    let secs = if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    };
    Some(secs.min(MAX_TTL_SECS))
}

#[async_trait]
impl<C: KvClient> Store for RemoteStore<C> {
    async fn set_state(&self, user: UserId, state: &str) -> StoreResult<()> {
        if state.is_empty() {
            return self.clear_state(user).await;
        }
        self.client
            .set(&self.state_key(user), state.as_bytes().to_vec(), None)
            .await
    }

    async fn get_state(&self, user: UserId) -> StoreResult<String> {
        let key = self.state_key(user);
        match self.client.get(&key).await? {
            Some(bytes) if !bytes.is_empty() => String::from_utf8(bytes)
                .map_err(|e| StoreError::backend(format!("state for user {user} is not UTF-8: {e}"))),
            _ => Err(StoreError::NotFound(key)),
        }
    }

    async fn clear_state(&self, user: UserId) -> StoreResult<()> {
        self.client.del(&[self.state_key(user)]).await
    }

    async fn clear_user(&self, user: UserId) -> StoreResult<()> {
        debug!(user = %user, "Clearing user state and data");
        self.client
            .del(&[self.state_key(user), self.data_key(user)])
            .await
    }

    async fn set_data(&self, user: UserId, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.client.hset(&self.data_key(user), key, value).await
    }

    async fn get_data(&self, user: UserId, key: &str) -> StoreResult<Vec<u8>> {
        let hash = self.data_key(user);
        self.client
            .hget(&hash, key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{hash}/{key}")))
    }

    async fn delete_data(&self, user: UserId, keys: &[&str]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.client.hdel(&self.data_key(user), keys).await
    }

    async fn set_temp_data(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let full = self.temp_key(key);
        match ttl_secs(ttl) {
            Some(secs) => self.client.set(&full, value, Some(secs)).await,
            None => self.client.del(&[full]).await,
        }
    }

    async fn get_temp_data(&self, key: &str) -> StoreResult<Vec<u8>> {
        let full = self.temp_key(key);
        self.client
            .get(&full)
            .await?
            .ok_or(StoreError::NotFound(full))
    }

    async fn delete_temp_data(&self, key: &str) -> StoreResult<()> {
        self.client.del(&[self.temp_key(key)]).await
    }
}

impl<C> std::fmt::Debug for RemoteStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    enum Value {
        Plain(Vec<u8>, Option<Instant>),
        Hash(HashMap<String, Vec<u8>>),
    }

    /// Key-value server double with server-side expiry.
    #[derive(Default)]
    struct FakeKv {
        entries: Mutex<HashMap<String, Value>>,
    }

    impl FakeKv {
        fn keys(&self) -> Vec<String> {
            let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
            keys.sort();
            keys
        }
    }

    #[async_trait]
    impl KvClient for FakeKv {
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            let mut entries = self.entries.lock();
            let expired = match entries.get(key) {
                Some(Value::Plain(v, expiry)) => match expiry {
                    Some(at) if Instant::now() >= *at => true,
                    _ => return Ok(Some(v.clone())),
                },
                Some(Value::Hash(_)) => return Err(StoreError::backend("WRONGTYPE")),
                None => return Ok(None),
            };
            if expired {
                entries.remove(key);
            }
            Ok(None)
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> StoreResult<()> {
            let expiry = ttl_secs.map(|s| Instant::now() + Duration::from_secs(s));
            self.entries
                .lock()
                .insert(key.to_string(), Value::Plain(value, expiry));
            Ok(())
        }

        async fn del(&self, keys: &[String]) -> StoreResult<()> {
            let mut entries = self.entries.lock();
            for key in keys {
                entries.remove(key);
            }
            Ok(())
        }

        async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
            match self.entries.lock().get(key) {
                Some(Value::Hash(map)) => Ok(map.get(field).cloned()),
                Some(Value::Plain(..)) => Err(StoreError::backend("WRONGTYPE")),
                None => Ok(None),
            }
        }

        async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<()> {
            let mut entries = self.entries.lock();
            let slot = entries
                .entry(key.to_string())
                .or_insert_with(|| Value::Hash(HashMap::new()));
            match slot {
                Value::Hash(map) => {
                    map.insert(field.to_string(), value);
                    Ok(())
                }
                Value::Plain(..) => Err(StoreError::backend("WRONGTYPE")),
            }
        }

        async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
            let mut entries = self.entries.lock();
            let now_empty = match entries.get_mut(key) {
                Some(Value::Hash(map)) => {
                    for field in fields {
                        map.remove(*field);
                    }
                    map.is_empty()
                }
                _ => false,
            };
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        }
    }

    #[test]
    fn test_ttl_rounds_up_to_seconds() {
        assert_eq!(ttl_secs(Duration::ZERO), None);
        assert_eq!(ttl_secs(Duration::from_millis(1)), Some(1));
        assert_eq!(ttl_secs(Duration::from_secs(5)), Some(5));
        assert_eq!(ttl_secs(Duration::from_millis(5_001)), Some(6));
    }

    #[test]
    fn test_ttl_caps_huge_durations() {
        assert_eq!(ttl_secs(Duration::MAX), Some(MAX_TTL_SECS));
        assert_eq!(ttl_secs(Duration::from_secs(u64::MAX)), Some(MAX_TTL_SECS));
    }

    #[tokio::test]
    async fn test_temp_data_with_unbounded_ttl() {
        let store = RemoteStore::new(FakeKv::default());
        store
            .set_temp_data("forever", b"x".to_vec(), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(store.get_temp_data("forever").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_key_layout() {
        let store = RemoteStore::with_prefix(FakeKv::default(), "bot");
        let user = UserId(42);

        store.set_state(user, "menu").await.unwrap();
        store.set_data(user, "login", b"\"bob\"".to_vec()).await.unwrap();
        store
            .set_temp_data("grades:42", vec![1], Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(
            store.client().keys(),
            vec!["bot:data:42", "bot:state:42", "bot:temp:grades:42"]
        );
    }

    #[tokio::test]
    async fn test_state_and_data() {
        let store = RemoteStore::new(FakeKv::default());
        let user = UserId(1);

        assert!(store.get_state(user).await.unwrap_err().is_not_found());
        store.set_state(user, "awaiting_login").await.unwrap();
        assert_eq!(store.get_state(user).await.unwrap(), "awaiting_login");
        store.set_state(user, "").await.unwrap();
        assert!(store.get_state(user).await.unwrap_err().is_not_found());

        store.set_data(user, "a", vec![1]).await.unwrap();
        store.set_data(user, "b", vec![2]).await.unwrap();
        store.delete_data(user, &["a"]).await.unwrap();
        assert!(store.get_data(user, "a").await.unwrap_err().is_not_found());
        assert_eq!(store.get_data(user, "b").await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_clear_user_is_scoped() {
        let store = RemoteStore::new(FakeKv::default());
        let (a, b) = (UserId(1), UserId(2));

        for user in [a, b] {
            store.set_state(user, "menu").await.unwrap();
            store.set_data(user, "k", vec![7]).await.unwrap();
        }
        store.clear_user(a).await.unwrap();

        assert!(store.get_state(a).await.unwrap_err().is_not_found());
        assert!(store.get_data(a, "k").await.unwrap_err().is_not_found());
        assert_eq!(store.get_state(b).await.unwrap(), "menu");
        assert_eq!(store.get_data(b, "k").await.unwrap(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_temp_data_expires_as_not_found() {
        let store = RemoteStore::new(FakeKv::default());

        store
            .set_temp_data("rating", b"[1,2]".to_vec(), Duration::from_millis(1_500))
            .await
            .unwrap();
        assert_eq!(store.get_temp_data("rating").await.unwrap(), b"[1,2]");

        // Rounded up to 2 s on the server.
        tokio::time::advance(Duration::from_millis(1_600)).await;
        assert!(store.get_temp_data("rating").await.is_ok());

        tokio::time::advance(Duration::from_millis(500)).await;
        let err = store.get_temp_data("rating").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_zero_ttl_stores_nothing() {
        let store = RemoteStore::new(FakeKv::default());
        store
            .set_temp_data("k", vec![1], Duration::from_secs(10))
            .await
            .unwrap();
        store.set_temp_data("k", vec![2], Duration::ZERO).await.unwrap();
        assert!(store.get_temp_data("k").await.unwrap_err().is_not_found());
    }
}
