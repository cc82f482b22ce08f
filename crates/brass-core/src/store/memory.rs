//! In-process store backed by sharded concurrent maps.
//!
//! Intended for tests and single-process deployments: everything lives until
//! it is deleted, the process exits, or (for temp data) its TTL elapses.
//! Expiry is lazy; an expired entry is dropped the next time it is read or
//! when [`MemoryStore::purge_expired`] runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use super::Store;
use crate::error::{StoreError, StoreResult};
use crate::event::UserId;

/// Everything stored for one user.
#[derive(Debug, Default)]
struct UserSlot {
    state: Option<String>,
    data: HashMap<String, Vec<u8>>,
}

impl UserSlot {
    fn is_empty(&self) -> bool {
        self.state.is_none() && self.data.is_empty()
    }
}

#[derive(Debug)]
struct TempEntry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl TempEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// A [`Store`] kept entirely in memory.
///
/// Per-user slots and temp entries live in [`DashMap`]s, so operations for
/// different users contend only when they hash to the same shard.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserSlot>,
    temp: DashMap<String, TempEntry>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of users with any state or data.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Drops every expired temp entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.temp.len();
        self.temp.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(self.temp.len());
        if removed > 0 {
            trace!(removed, "Purged expired temp data");
        }
        removed
    }

    fn state_key(user: UserId) -> String {
        format!("state:{user}")
    }

    fn data_key(user: UserId, key: &str) -> String {
        format!("data:{user}:{key}")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_state(&self, user: UserId, state: &str) -> StoreResult<()> {
        if state.is_empty() {
            return self.clear_state(user).await;
        }
        self.users.entry(user).or_default().state = Some(state.to_string());
        Ok(())
    }

    async fn get_state(&self, user: UserId) -> StoreResult<String> {
        self.users
            .get(&user)
            .and_then(|slot| slot.state.clone())
            .ok_or_else(|| StoreError::not_found(Self::state_key(user)))
    }

    async fn clear_state(&self, user: UserId) -> StoreResult<()> {
        if let Some(mut slot) = self.users.get_mut(&user) {
            slot.state = None;
        }
        self.users.remove_if(&user, |_, slot| slot.is_empty());
        Ok(())
    }

    async fn clear_user(&self, user: UserId) -> StoreResult<()> {
        self.users.remove(&user);
        Ok(())
    }

    async fn set_data(&self, user: UserId, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.users
            .entry(user)
            .or_default()
            .data
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_data(&self, user: UserId, key: &str) -> StoreResult<Vec<u8>> {
        self.users
            .get(&user)
            .and_then(|slot| slot.data.get(key).cloned())
            .ok_or_else(|| StoreError::not_found(Self::data_key(user, key)))
    }

    async fn delete_data(&self, user: UserId, keys: &[&str]) -> StoreResult<()> {
        if let Some(mut slot) = self.users.get_mut(&user) {
            for key in keys {
                slot.data.remove(*key);
            }
        }
        self.users.remove_if(&user, |_, slot| slot.is_empty());
        Ok(())
    }

    async fn set_temp_data(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let entry = TempEntry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.temp.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_temp_data(&self, key: &str) -> StoreResult<Vec<u8>> {
        let now = Instant::now();
        match self.temp.get(key) {
            None => return Err(StoreError::not_found(key)),
            Some(entry) if entry.is_live(now) => return Ok(entry.value.clone()),
            Some(_) => {}
        }
        // Expired: the shard guard above is released before removing.
        self.temp.remove_if(key, |_, entry| !entry.is_live(now));
        Err(StoreError::not_found(key))
    }

    async fn delete_temp_data(&self, key: &str) -> StoreResult<()> {
        self.temp.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = MemoryStore::new();
        let user = UserId(1);

        assert!(store.get_state(user).await.unwrap_err().is_not_found());

        assert_ok!(store.set_state(user, "awaiting_login").await);
        assert_eq!(store.get_state(user).await.unwrap(), "awaiting_login");

        assert_ok!(store.set_state(user, "awaiting_password").await);
        assert_eq!(store.get_state(user).await.unwrap(), "awaiting_password");

        assert_ok!(store.clear_state(user).await);
        assert_err!(store.get_state(user).await);
    }

    #[tokio::test]
    async fn test_empty_state_means_no_state() {
        let store = MemoryStore::new();
        let user = UserId(9);

        store.set_state(user, "menu").await.unwrap();
        store.set_state(user, "").await.unwrap();

        assert!(store.get_state(user).await.unwrap_err().is_not_found());
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn test_data_set_get_delete() {
        let store = MemoryStore::new();
        let user = UserId(2);

        store.set_data(user, "login", b"alice".to_vec()).await.unwrap();
        store.set_data(user, "token", b"t0k".to_vec()).await.unwrap();

        assert_eq!(store.get_data(user, "login").await.unwrap(), b"alice");

        store.delete_data(user, &["login", "missing"]).await.unwrap();
        assert!(store.get_data(user, "login").await.unwrap_err().is_not_found());
        assert_eq!(store.get_data(user, "token").await.unwrap(), b"t0k");
    }

    #[tokio::test]
    async fn test_clear_user_leaves_other_users_untouched() {
        let store = MemoryStore::new();
        let target = UserId(10);
        let bystander = UserId(11);

        for user in [target, bystander] {
            store.set_state(user, "menu").await.unwrap();
            store.set_data(user, "semester", b"5".to_vec()).await.unwrap();
        }

        store.clear_user(target).await.unwrap();

        assert!(store.get_state(target).await.unwrap_err().is_not_found());
        assert!(store.get_data(target, "semester").await.unwrap_err().is_not_found());

        assert_eq!(store.get_state(bystander).await.unwrap(), "menu");
        assert_eq!(store.get_data(bystander, "semester").await.unwrap(), b"5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_temp_data_expires() {
        let store = MemoryStore::new();

        store
            .set_temp_data("schedule:group-7", b"[]".to_vec(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.get_temp_data("schedule:group-7").await.unwrap(), b"[]");

        tokio::time::advance(Duration::from_secs(31)).await;

        let err = store.get_temp_data("schedule:group-7").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set_temp_data("short", vec![1], Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set_temp_data("long", vec![2], Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get_temp_data("long").await.unwrap(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_temp_data_with_unbounded_ttl() {
        let store = MemoryStore::new();
        assert_ok!(store.set_temp_data("forever", vec![7], Duration::MAX).await);

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;

        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.get_temp_data("forever").await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_delete_temp_data() {
        let store = MemoryStore::new();
        store
            .set_temp_data("k", vec![1], Duration::from_secs(60))
            .await
            .unwrap();
        store.delete_temp_data("k").await.unwrap();
        assert_err!(store.get_temp_data("k").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_users() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();

        for id in 0..64 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let user = UserId(id);
                for round in 0..50 {
                    store
                        .set_data(user, "round", round.to_string().into_bytes())
                        .await
                        .unwrap();
                    store.set_state(user, "busy").await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.user_count(), 64);
        for id in 0..64 {
            assert_eq!(store.get_data(UserId(id), "round").await.unwrap(), b"49");
        }
    }
}
