//! Per-event context handed to middleware and handlers.
//!
//! One [`Context`] is created by the dispatcher for every routed event and
//! shared behind an `Arc` through the whole middleware chain. It carries:
//!
//! - the [`Event`] itself and the route that matched it
//!   ([`namespace`](Context::namespace), [`route`](Context::route));
//! - the [`Params`] captured when a callback tree pattern matched;
//! - the shared [`Store`], exposed both raw ([`store`](Context::store)) and
//!   through typed helpers that serialise with `serde_json`;
//! - a small type-keyed extension map so middleware can pass values down to
//!   handlers.
//!
//! ```rust,ignore
//! async fn pick_semester(ctx: Arc<Context>) -> Result<(), BoxError> {
//!     let semester: u32 = ctx.param("semester_id").unwrap_or_default().parse()?;
//!     ctx.set_data("semester", &semester).await?;
//!     ctx.set_state("awaiting_subject").await?;
//!     Ok(())
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use brass_core::store::{self, BoxedStore};
use brass_core::{Event, StoreResult, UserId};

use crate::path::Params;
use crate::router::Namespace;

/// The context of one dispatched event.
pub struct Context {
    event: Event,
    namespace: Namespace,
    route: String,
    params: Params,
    store: BoxedStore,
    extensions: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Context {
    /// Creates a context for `event` routed through `namespace` under `route`.
    pub fn new(
        event: Event,
        namespace: Namespace,
        route: impl Into<String>,
        params: Params,
        store: BoxedStore,
    ) -> Self {
        Self {
            event,
            namespace,
            route: route.into(),
            params,
            store,
            extensions: Mutex::new(HashMap::new()),
        }
    }

    // ─── Event ────────────────────────────────────────────────────────────────

    /// Returns the event being handled.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Returns the sender of the event.
    pub fn user_id(&self) -> UserId {
        self.event.user_id
    }

    /// Returns the chat the event belongs to.
    pub fn chat_id(&self) -> i64 {
        self.event.chat_id
    }

    /// Returns the message the event refers to.
    pub fn message_id(&self) -> i64 {
        self.event.message_id
    }

    /// Returns the raw text or callback data.
    pub fn text(&self) -> &str {
        self.event.raw()
    }

    // ─── Route ────────────────────────────────────────────────────────────────

    /// Returns the namespace whose route matched.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Returns the key, pattern or state name of the matched route.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Returns the parameters captured by a callback tree pattern.
    ///
    /// Empty for every other kind of route.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns one captured parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    // ─── Store ────────────────────────────────────────────────────────────────

    /// Returns the shared store.
    pub fn store(&self) -> &BoxedStore {
        &self.store
    }

    /// Returns the conversation state of the sender.
    pub async fn state(&self) -> StoreResult<String> {
        self.store.get_state(self.user_id()).await
    }

    /// Moves the sender to `state`. The empty string clears it.
    pub async fn set_state(&self, state: &str) -> StoreResult<()> {
        self.store.set_state(self.user_id(), state).await
    }

    /// Clears the conversation state of the sender.
    pub async fn clear_state(&self) -> StoreResult<()> {
        self.store.clear_state(self.user_id()).await
    }

    /// Removes the state and all data of the sender.
    pub async fn clear_user(&self) -> StoreResult<()> {
        self.store.clear_user(self.user_id()).await
    }

    /// Reads and decodes a data value of the sender.
    pub async fn data<T: DeserializeOwned>(&self, key: &str) -> StoreResult<T> {
        let bytes = self.store.get_data(self.user_id(), key).await?;
        store::decode(key, &bytes)
    }

    /// Encodes and stores a data value for the sender.
    pub async fn set_data<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = store::encode(key, value)?;
        self.store.set_data(self.user_id(), key, bytes).await
    }

    /// Deletes data keys of the sender.
    pub async fn delete_data(&self, keys: &[&str]) -> StoreResult<()> {
        self.store.delete_data(self.user_id(), keys).await
    }

    /// Reads and decodes a global temp value.
    pub async fn temp_data<T: DeserializeOwned>(&self, key: &str) -> StoreResult<T> {
        let bytes = self.store.get_temp_data(key).await?;
        store::decode(key, &bytes)
    }

    /// Encodes and stores a global temp value that expires after `ttl`.
    pub async fn set_temp_data<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> StoreResult<()> {
        let bytes = store::encode(key, value)?;
        self.store.set_temp_data(key, bytes, ttl).await
    }

    /// Deletes a global temp value.
    pub async fn delete_temp_data(&self, key: &str) -> StoreResult<()> {
        self.store.delete_temp_data(key).await
    }

    // ─── Extensions ───────────────────────────────────────────────────────────

    /// Stores a value for later middleware or the handler.
    ///
    /// Only one value per type is kept; inserting again overwrites.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored value of type `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.extensions
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if a value of type `T` is stored.
    pub fn contains<T: 'static>(&self) -> bool {
        self.extensions.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored value of type `T`.
    pub fn take<T: 'static>(&self) -> Option<T> {
        self.extensions
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("namespace", &self.namespace)
            .field("route", &self.route)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
