//! Event dispatcher for the Brass framework.
//!
//! The [`Dispatcher`] routes a single event to at most one handler:
//!
//! 1. the route table is searched directly (command name, message text,
//!    callback data, callback tree);
//! 2. if nothing matched and the event class allows it, the sender's
//!    conversation state is read from the store and looked up among the
//!    state routes;
//! 3. the resolved handler runs inside its middleware with a fresh
//!    [`Context`].
//!
//! Handler errors are logged here and reported in the returned [`Dispatch`];
//! they never propagate further.

use std::sync::Arc;

use tower::ServiceExt;
use tracing::{Instrument, Level, debug, error, span, warn};

use brass_core::{BoxedStore, Event};

use crate::context::Context;
use crate::error::{BoxError, EventSkipped};
use crate::router::{Namespace, ResolvedRoute, RouteTable};

/// The outcome of dispatching one event.
#[derive(Debug)]
pub enum Dispatch {
    /// A handler ran to completion.
    Handled {
        /// Namespace of the route that ran.
        namespace: Namespace,
        /// Key, pattern or state name of the route.
        route: String,
    },
    /// A rule in the middleware chain rejected the event.
    Skipped,
    /// No route matched; the event was dropped.
    Unrouted,
    /// The handler or its middleware failed.
    Failed(BoxError),
}

impl Dispatch {
    /// Returns `true` if a handler ran successfully.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }

    /// Returns `true` if no route matched.
    pub fn is_unrouted(&self) -> bool {
        matches!(self, Self::Unrouted)
    }

    /// Returns `true` if the handler failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Routes events through a [`RouteTable`].
///
/// Cheap to clone; clones share the table and the store.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    store: BoxedStore,
}

impl Dispatcher {
    /// Creates a dispatcher over `table`, handing `store` to every context.
    pub fn new(table: impl Into<Arc<RouteTable>>, store: BoxedStore) -> Self {
        Self {
            table: table.into(),
            store,
        }
    }

    /// Returns the route table.
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Returns the store shared with handlers.
    pub fn store(&self) -> &BoxedStore {
        &self.store
    }

    async fn resolve(&self, event: &Event) -> Option<ResolvedRoute> {
        if let Some(route) = self.table.resolve_direct(event) {
            return Some(route);
        }
        if !self.table.wants_state(event) {
            return None;
        }

        match self.store.get_state(event.user_id).await {
            Ok(state) => self.table.resolve_state(&state),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(error = %e, "State lookup failed, dropping event");
                None
            }
        }
    }

    /// Dispatches `event` to its handler.
    pub async fn dispatch(&self, event: Event) -> Dispatch {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            user = %event.user_id,
            kind = event.kind.name(),
        );

        async move {
            let Some(route) = self.resolve(&event).await else {
                debug!(raw = event.raw(), "No route for event");
                return Dispatch::Unrouted;
            };

            let namespace = route.namespace;
            let key = route.key;
            let ctx = Arc::new(Context::new(
                event,
                namespace,
                key.clone(),
                route.params,
                Arc::clone(&self.store),
            ));

            match route.service.oneshot(ctx).await {
                Ok(()) => Dispatch::Handled {
                    namespace,
                    route: key,
                },
                Err(e) if e.is::<EventSkipped>() => {
                    debug!(%namespace, route = %key, "Event skipped by rule");
                    Dispatch::Skipped
                }
                Err(e) => {
                    error!(%namespace, route = %key, error = %e, "Handler failed");
                    Dispatch::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
