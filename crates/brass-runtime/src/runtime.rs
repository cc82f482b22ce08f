//! The dispatch loop.
//!
//! [`BrassRuntime`] owns a [`Dispatcher`] and feeds it from an
//! [`EventSource`], one tracked task per event:
//!
//! ```rust,ignore
//! let mut router = Router::new();
//! router.command("start", start);
//!
//! let runtime = BrassRuntime::builder()
//!     .config_file("brass.toml")
//!     .build(router)
//!     .await?;
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(256);
//! tokio::spawn(poll_platform(tx));
//! let stats = runtime.run(rx).await;
//! ```
//!
//! A failing or panicking handler only loses its own event. On shutdown
//! the loop stops taking events and waits for those in flight, bounded by
//! `dispatch.drain_timeout_secs`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use brass_core::{BoxedStore, MemoryStore};
use brass_framework::{Dispatch, Dispatcher, Router, panic_message};

use crate::config::{BrassConfig, ConfigLoader, StoreBackend, StoreConfig};
use crate::error::RuntimeResult;
use crate::logging;
use crate::source::EventSource;

/// Snapshot of the dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Events taken from the source.
    pub dispatched: u64,
    /// Events a handler completed.
    pub handled: u64,
    /// Events a rule rejected.
    pub skipped: u64,
    /// Events no route matched.
    pub unrouted: u64,
    /// Events whose handler failed, including panics.
    pub failed: u64,
}

impl RuntimeStats {
    /// Events taken but not yet finished (or abandoned at drain timeout).
    pub fn in_flight(&self) -> u64 {
        self.dispatched
            .saturating_sub(self.handled + self.skipped + self.unrouted + self.failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    handled: AtomicU64,
    skipped: AtomicU64,
    unrouted: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &Dispatch) {
        let counter = match outcome {
            Dispatch::Handled { .. } => &self.handled,
            Dispatch::Skipped => &self.skipped,
            Dispatch::Unrouted => &self.unrouted,
            Dispatch::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// The Brass runtime: a route table, a store and the loop that drives them.
pub struct BrassRuntime {
    config: BrassConfig,
    dispatcher: Dispatcher,
    purge: Option<(Arc<MemoryStore>, Duration)>,
    counters: Arc<Counters>,
}

impl BrassRuntime {
    /// Creates a builder that loads configuration from the usual places.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Builds the route table and wires it to an existing store.
    ///
    /// Logging is left alone and no background purge runs.
    pub fn new(router: Router, store: BoxedStore, config: BrassConfig) -> RuntimeResult<Self> {
        let table = router.build()?;
        info!(routes = table.len(), "Route table built");

        Ok(Self {
            config,
            dispatcher: Dispatcher::new(table, store),
            purge: None,
            counters: Arc::default(),
        })
    }

    /// Initializes logging, opens the configured store and builds the route table.
    pub async fn from_config(config: BrassConfig, router: Router) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);
        Self::assemble(config, router, None).await
    }

    async fn assemble(
        config: BrassConfig,
        router: Router,
        store: Option<BoxedStore>,
    ) -> RuntimeResult<Self> {
        let (store, purge) = match store {
            Some(store) => (store, None),
            None => match build_store(&config.store).await? {
                OpenedStore::Memory(memory) => {
                    let purge = config
                        .store
                        .purge_interval()
                        .map(|every| (Arc::clone(&memory), every));
                    (memory as BoxedStore, purge)
                }
                OpenedStore::Remote(store) => (store, None),
            },
        };

        let mut runtime = Self::new(router, store, config)?;
        runtime.purge = purge;

        info!(
            store = %runtime.config.store.backend,
            drain_timeout_secs = runtime.config.dispatch.drain_timeout_secs,
            "Runtime initialized"
        );
        Ok(runtime)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BrassConfig {
        &self.config
    }

    /// Returns the dispatcher, e.g. to dispatch an event synchronously in tests.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the store shared with handlers.
    pub fn store(&self) -> &BoxedStore {
        self.dispatcher.store()
    }

    /// Returns the current counters.
    pub fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }

    /// Runs until Ctrl+C or SIGTERM, or until `source` is exhausted.
    pub async fn run<S: EventSource>(&self, source: S) -> RuntimeStats {
        self.run_until(source, wait_for_shutdown()).await
    }

    /// Runs until `signal` completes, or until `source` is exhausted.
    pub async fn run_until<S, F>(&self, source: S, signal: F) -> RuntimeStats
    where
        S: EventSource,
        F: Future<Output = ()>,
    {
        let shutdown = CancellationToken::new();
        let serve = self.serve(source, shutdown.clone());
        tokio::pin!(serve);

        tokio::select! {
            stats = &mut serve => return stats,
            _ = signal => shutdown.cancel(),
        }
        serve.await
    }

    /// Takes events from `source` until `shutdown` is cancelled or the source
    /// ends, then drains in-flight events and returns the final counters.
    pub async fn serve<S: EventSource>(
        &self,
        mut source: S,
        shutdown: CancellationToken,
    ) -> RuntimeStats {
        let tracker = TaskTracker::new();
        let background = shutdown.child_token();

        if let Some((memory, every)) = &self.purge {
            tracker.spawn(purge_loop(Arc::clone(memory), *every, background.clone()));
        }

        info!(routes = self.dispatcher.table().len(), "Dispatch loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer taking events");
                    break;
                }
                event = source.next_event() => event,
            };
            let Some(event) = event else {
                info!("Event source exhausted");
                break;
            };

            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            let dispatcher = self.dispatcher.clone();
            let counters = Arc::clone(&self.counters);

            tracker.spawn(async move {
                let user = event.user_id;
                match AssertUnwindSafe(dispatcher.dispatch(event))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => counters.record(&outcome),
                    Err(payload) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(
                            %user,
                            panic = %panic_message(payload.as_ref()),
                            "Handler panicked outside recover()"
                        );
                    }
                }
            });
        }

        background.cancel();
        tracker.close();
        self.drain(&tracker).await;

        let stats = self.stats();
        info!(
            dispatched = stats.dispatched,
            handled = stats.handled,
            skipped = stats.skipped,
            unrouted = stats.unrouted,
            failed = stats.failed,
            "Dispatch loop stopped"
        );
        stats
    }

    async fn drain(&self, tracker: &TaskTracker) {
        if tracker.is_empty() {
            return;
        }
        debug!(in_flight = tracker.len(), "Draining in-flight events");

        match self.config.dispatch.drain_timeout() {
            None => tracker.wait().await,
            Some(limit) => {
                if tokio::time::timeout(limit, tracker.wait()).await.is_err() {
                    warn!(
                        in_flight = tracker.len(),
                        timeout_secs = limit.as_secs(),
                        "Drain timeout elapsed, abandoning in-flight events"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for BrassRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrassRuntime")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

enum OpenedStore {
    Memory(Arc<MemoryStore>),
    Remote(BoxedStore),
}

async fn build_store(config: &StoreConfig) -> RuntimeResult<OpenedStore> {
    match config.backend {
        StoreBackend::Memory => Ok(OpenedStore::Memory(Arc::new(MemoryStore::new()))),
        StoreBackend::Redis => open_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn open_redis(config: &StoreConfig) -> RuntimeResult<OpenedStore> {
    use brass_core::{RedisKv, RemoteStore};

    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| crate::config::ConfigError::missing_field("store.redis_url"))?;
    let client = RedisKv::connect(url).await?;
    info!(prefix = %config.key_prefix, "Connected to Redis store");
    Ok(OpenedStore::Remote(Arc::new(RemoteStore::with_prefix(
        client,
        config.key_prefix.clone(),
    ))))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_config: &StoreConfig) -> RuntimeResult<OpenedStore> {
    Err(crate::error::RuntimeError::FeatureDisabled("redis"))
}

async fn purge_loop(store: Arc<MemoryStore>, every: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                store.purge_expired();
            }
        }
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`BrassRuntime`].
///
/// ```rust,ignore
/// let runtime = BrassRuntime::builder()
///     .profile("production")
///     .config_file("deploy/brass.toml")
///     .build(router)
///     .await?;
/// ```
pub struct RuntimeBuilder {
    config: Option<BrassConfig>,
    config_file: Option<PathBuf>,
    profile: Option<String>,
    store: Option<BoxedStore>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: None,
            config_file: None,
            profile: None,
            store: None,
            init_logging: true,
        }
    }

    /// Loads configuration from this file instead of searching.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Selects the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: BrassConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `store` instead of opening the configured backend.
    pub fn store(mut self, store: BoxedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Leaves the global `tracing` subscriber untouched.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads configuration and builds the runtime around `router`.
    pub async fn build(self, router: Router) -> RuntimeResult<BrassRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let mut loader = ConfigLoader::new();
                if let Some(profile) = &self.profile {
                    loader = loader.profile(profile);
                }
                if let Some(path) = &self.config_file {
                    loader = loader.file(path);
                }
                loader.load()?
            }
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        BrassRuntime::assemble(config, router, self.store).await
    }
}
