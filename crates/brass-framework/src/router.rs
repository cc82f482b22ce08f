//! Route registration and the immutable route table.
//!
//! A [`Router`] collects handlers into five independent namespaces:
//!
//! | Namespace | Key | Registered with |
//! |-----------|-----|-----------------|
//! | [`Namespace::Command`] | command name, without `/` | [`Routes::command`] |
//! | [`Namespace::Message`] | exact message text | [`Routes::message`] |
//! | [`Namespace::Callback`] | exact callback data | [`Routes::callback`] |
//! | [`Namespace::CallbackTree`] | path pattern | [`Routes::callback_tree`] |
//! | [`Namespace::State`] | conversation state name | [`Routes::state`] |
//!
//! Groups scope middleware. A [`Group`] holds its own middleware list and
//! registers straight into the router it was created from, so handler
//! storage is never duplicated. A sub-group starts from a *copy* of its
//! parent's list; siblings never see each other's middleware.
//!
//! ```rust,ignore
//! let mut router = Router::new();
//! router.use_middleware(trace());
//! router.command("start", start);
//!
//! let mut grades = router.group([auth()]);
//! grades.callback("/grades", list_semesters);
//! grades.callback_tree("/grades/semester/:semester_id", show_semester);
//! grades.state("awaiting_semester", read_semester);
//!
//! let table = router.build()?;
//! ```
//!
//! # Resolution order
//!
//! [`Router::build`] applies global middleware outside group middleware and
//! yields a [`RouteTable`]. Lookups then follow a fixed order per event
//! class:
//!
//! - command: exact command name only;
//! - message: exact text, then the sender's state;
//! - callback: exact data, then the callback tree, then the sender's state.
//!
//! The state step needs a store round-trip and is performed by the
//! dispatcher through [`RouteTable::resolve_state`].

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use brass_core::{Event, EventKind};

use crate::error::RouteError;
use crate::handler::{BoxedHandlerService, Handler, into_service};
use crate::middleware::{Middleware, compose};
use crate::path::{Params, PathTree, Pattern};

/// One of the independent route registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Commands, keyed by name.
    Command,
    /// Free-text messages, keyed by exact text.
    Message,
    /// Callbacks, keyed by exact data.
    Callback,
    /// Callbacks, matched against path patterns.
    CallbackTree,
    /// Conversation states, keyed by state name.
    State,
}

impl Namespace {
    /// Every namespace, in resolution order.
    pub const ALL: [Namespace; 5] = [
        Namespace::Command,
        Namespace::Message,
        Namespace::Callback,
        Namespace::CallbackTree,
        Namespace::State,
    ];

    /// Returns the name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Message => "message",
            Self::Callback => "callback",
            Self::CallbackTree => "callback_tree",
            Self::State => "state",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strips the leading `/` from a command key.
fn normalize_command(key: &str) -> &str {
    key.strip_prefix('/').unwrap_or(key)
}

// ============================================================================
// Registration
// ============================================================================

/// A handler as registered, before middleware is applied.
#[derive(Clone)]
struct Registration {
    handler: BoxedHandlerService,
    middleware: Vec<Middleware>,
}

/// Route registration shared by [`Router`] and [`Group`].
///
/// Registering the same key twice in a namespace replaces the earlier
/// handler. A callback tree pattern with the same shape as an earlier one
/// but different parameter names is ignored.
pub trait Routes {
    /// Registers a boxed service in `namespace` under `key`, wrapped in the
    /// middleware in scope.
    fn route(&mut self, namespace: Namespace, key: &str, service: BoxedHandlerService) -> &mut Self;

    /// Opens a group whose middleware runs inside everything already in
    /// scope.
    fn group<I>(&mut self, middleware: I) -> Group<'_>
    where
        I: IntoIterator<Item = Middleware>;

    /// Registers a command handler. A leading `/` in `name` is ignored.
    fn command<H, T>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Namespace::Command, normalize_command(name), into_service(handler))
    }

    /// Registers a handler for messages whose text equals `text`.
    fn message<H, T>(&mut self, text: &str, handler: H) -> &mut Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Namespace::Message, text, into_service(handler))
    }

    /// Registers a handler for callbacks whose data equals `data`.
    fn callback<H, T>(&mut self, data: &str, handler: H) -> &mut Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Namespace::Callback, data, into_service(handler))
    }

    /// Registers a handler for callbacks matching a path pattern such as
    /// `/grades/semester/:semester_id`.
    ///
    /// The pattern is compiled by [`Router::build`].
    fn callback_tree<H, T>(&mut self, pattern: &str, handler: H) -> &mut Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Namespace::CallbackTree, pattern, into_service(handler))
    }

    /// Registers a handler for senders in conversation state `state`.
    fn state<H, T>(&mut self, state: &str, handler: H) -> &mut Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Namespace::State, state, into_service(handler))
    }
}

/// Builder collecting routes and global middleware.
#[derive(Default)]
pub struct Router {
    exact: HashMap<Namespace, HashMap<String, Registration>>,
    trees: Vec<(String, Registration)>,
    global: Vec<Middleware>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds middleware that wraps every route, outside any group middleware.
    ///
    /// Applies to routes registered both before and after this call.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.global.push(middleware);
        self
    }

    fn insert(&mut self, namespace: Namespace, key: &str, registration: Registration) {
        if namespace == Namespace::CallbackTree {
            self.trees.push((key.to_string(), registration));
            return;
        }

        let previous = self
            .exact
            .entry(namespace)
            .or_default()
            .insert(key.to_string(), registration);
        if previous.is_some() {
            warn!(%namespace, key, "Route registered twice, keeping the latest handler");
        } else {
            debug!(%namespace, key, "Route registered");
        }
    }

    /// Applies middleware and compiles patterns into a [`RouteTable`].
    ///
    /// Fails when a callback tree pattern does not compile.
    pub fn build(self) -> Result<RouteTable, RouteError> {
        let global = self.global;
        let wrap = |registration: Registration| {
            compose(&global, compose(&registration.middleware, registration.handler))
        };

        let mut exact = HashMap::new();
        for (namespace, routes) in self.exact {
            let routes: HashMap<_, _> = routes
                .into_iter()
                .map(|(key, registration)| (key, wrap(registration)))
                .collect();
            exact.insert(namespace, routes);
        }

        let mut tree = PathTree::new();
        for (pattern, registration) in self.trees {
            let compiled = Pattern::compile(&pattern)
                .map_err(|source| RouteError::InvalidPattern { pattern, source })?;
            tree.insert(compiled, wrap(registration));
        }

        let table = RouteTable { exact, tree };
        debug!(
            commands = table.route_count(Namespace::Command),
            messages = table.route_count(Namespace::Message),
            callbacks = table.route_count(Namespace::Callback),
            trees = table.route_count(Namespace::CallbackTree),
            states = table.route_count(Namespace::State),
            "Route table built"
        );
        Ok(table)
    }
}

impl Routes for Router {
    fn route(&mut self, namespace: Namespace, key: &str, service: BoxedHandlerService) -> &mut Self {
        let registration = Registration {
            handler: service,
            middleware: Vec::new(),
        };
        self.insert(namespace, key, registration);
        self
    }

    fn group<I>(&mut self, middleware: I) -> Group<'_>
    where
        I: IntoIterator<Item = Middleware>,
    {
        Group {
            router: self,
            middleware: middleware.into_iter().collect(),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("trees", &self.trees.len())
            .field("global_middleware", &self.global.len())
            .finish_non_exhaustive()
    }
}

/// A registration scope with its own middleware list.
///
/// Exists only while routes are being registered.
pub struct Group<'r> {
    router: &'r mut Router,
    middleware: Vec<Middleware>,
}

impl Group<'_> {
    /// Returns the middleware applied to routes of this group, outermost
    /// first, excluding global middleware.
    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }
}

impl Routes for Group<'_> {
    fn route(&mut self, namespace: Namespace, key: &str, service: BoxedHandlerService) -> &mut Self {
        let registration = Registration {
            handler: service,
            middleware: self.middleware.clone(),
        };
        self.router.insert(namespace, key, registration);
        self
    }

    fn group<I>(&mut self, middleware: I) -> Group<'_>
    where
        I: IntoIterator<Item = Middleware>,
    {
        let mut chain = self.middleware.clone();
        chain.extend(middleware);
        Group {
            router: &mut *self.router,
            middleware: chain,
        }
    }
}

// ============================================================================
// RouteTable
// ============================================================================

/// A route resolved for one event.
#[derive(Clone)]
pub struct ResolvedRoute {
    /// Namespace the route belongs to.
    pub namespace: Namespace,
    /// Key, pattern or state name of the route.
    pub key: String,
    /// Parameters captured by a callback tree pattern.
    pub params: Params,
    /// The handler wrapped in its middleware.
    pub service: BoxedHandlerService,
}

impl fmt::Debug for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("namespace", &self.namespace)
            .field("key", &self.key)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Immutable routes with middleware applied, produced by [`Router::build`].
pub struct RouteTable {
    exact: HashMap<Namespace, HashMap<String, BoxedHandlerService>>,
    tree: PathTree<BoxedHandlerService>,
}

impl RouteTable {
    /// Returns the number of routes in `namespace`.
    pub fn route_count(&self, namespace: Namespace) -> usize {
        match namespace {
            Namespace::CallbackTree => self.tree.len(),
            other => self.exact.get(&other).map_or(0, HashMap::len),
        }
    }

    /// Returns the total number of routes.
    pub fn len(&self) -> usize {
        Namespace::ALL.iter().map(|ns| self.route_count(*ns)).sum()
    }

    /// Returns `true` if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn exact(&self, namespace: Namespace, key: &str) -> Option<ResolvedRoute> {
        let service = self.exact.get(&namespace)?.get(key)?;
        Some(ResolvedRoute {
            namespace,
            key: key.to_string(),
            params: Params::new(),
            service: service.clone(),
        })
    }

    /// Resolves `event` against every namespace except the state one.
    pub fn resolve_direct(&self, event: &Event) -> Option<ResolvedRoute> {
        match &event.kind {
            EventKind::Command(_) => self.exact(Namespace::Command, event.command_name()?),
            EventKind::Message(text) => self.exact(Namespace::Message, text),
            EventKind::Callback(data) => self.exact(Namespace::Callback, data).or_else(|| {
                let found = self.tree.find(data)?;
                Some(ResolvedRoute {
                    namespace: Namespace::CallbackTree,
                    key: found.pattern.to_string(),
                    params: found.params,
                    service: found.value.clone(),
                })
            }),
        }
    }

    /// Returns `true` when `event` may fall back to a state route: it is not
    /// a command and at least one state route exists.
    pub fn wants_state(&self, event: &Event) -> bool {
        !matches!(event.kind, EventKind::Command(_)) && self.route_count(Namespace::State) > 0
    }

    /// Resolves the state route for `state`.
    pub fn resolve_state(&self, state: &str) -> Option<ResolvedRoute> {
        self.exact(Namespace::State, state)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RouteTable");
        for ns in Namespace::ALL {
            s.field(ns.as_str(), &self.route_count(ns));
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use brass_core::MemoryStore;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use crate::context::Context;
    use crate::error::PatternError;
    use crate::middleware::{Next, from_fn};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn tag(log: &Log, name: &'static str) -> Middleware {
        let log = log.clone();
        from_fn(move |ctx: Arc<Context>, next: Next| {
            let log = log.clone();
            async move {
                log.lock().push(name);
                next.run(ctx).await
            }
        })
    }

    async fn run(table: &RouteTable, event: Event) -> Option<ResolvedRoute> {
        let route = table.resolve_direct(&event)?;
        let ctx = Arc::new(Context::new(
            event,
            route.namespace,
            route.key.clone(),
            route.params.clone(),
            Arc::new(MemoryStore::new()),
        ));
        route.service.clone().oneshot(ctx).await.unwrap();
        Some(route)
    }

    #[tokio::test]
    async fn test_group_middleware_is_scoped() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        {
            let mut outer = router.group([tag(&log, "A")]);
            outer.command("outer", || async {});
            {
                let mut inner = outer.group([tag(&log, "B")]);
                inner.command("inner", || async {});
            }
            let mut sibling = outer.group([tag(&log, "C")]);
            sibling.command("sibling", || async {});
        }
        router.command("bare", || async {});
        let table = router.build().unwrap();

        run(&table, Event::command(1, "/inner")).await.unwrap();
        assert_eq!(*log.lock(), vec!["A", "B"]);

        log.lock().clear();
        run(&table, Event::command(1, "/outer")).await.unwrap();
        assert_eq!(*log.lock(), vec!["A"]);

        log.lock().clear();
        run(&table, Event::command(1, "/sibling")).await.unwrap();
        assert_eq!(*log.lock(), vec!["A", "C"]);

        log.lock().clear();
        run(&table, Event::command(1, "/bare")).await.unwrap();
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_global_middleware_wraps_groups() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router
            .group([tag(&log, "group")])
            .message("hi", || async {});
        router.use_middleware(tag(&log, "global"));
        let table = router.build().unwrap();

        run(&table, Event::message(1, "hi")).await.unwrap();
        assert_eq!(*log.lock(), vec!["global", "group"]);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        let (first, second) = (log.clone(), log.clone());
        router.callback("/menu", move || {
            let log = first.clone();
            async move { log.lock().push("first") }
        });
        router.callback("/menu", move || {
            let log = second.clone();
            async move { log.lock().push("second") }
        });
        let table = router.build().unwrap();

        assert_eq!(table.route_count(Namespace::Callback), 1);
        run(&table, Event::callback(1, "/menu")).await.unwrap();
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let mut router = Router::new();
        router.callback_tree("/grades/:/x", || async {});
        let err = router.build().unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidPattern {
                ref pattern,
                source: PatternError::EmptyParamName { position: 2 },
            } if pattern == "/grades/:/x"
        ));
    }

    #[test]
    fn test_resolution_order() {
        let mut router = Router::new();
        router
            .command("/start", || async {})
            .message("Grades", || async {})
            .callback("/grades/semester/current", || async {})
            .callback_tree("/grades/semester/:semester_id", || async {})
            .state("awaiting_login", || async {});
        let table = router.build().unwrap();
        assert_eq!(table.len(), 5);

        let r = table.resolve_direct(&Event::command(1, "/start@grades_bot")).unwrap();
        assert_eq!((r.namespace, r.key.as_str()), (Namespace::Command, "start"));

        let r = table
            .resolve_direct(&Event::callback(1, "/grades/semester/current"))
            .unwrap();
        assert_eq!(r.namespace, Namespace::Callback);

        let r = table
            .resolve_direct(&Event::callback(1, "/grades/semester/3"))
            .unwrap();
        assert_eq!(r.namespace, Namespace::CallbackTree);
        assert_eq!(r.key, "/grades/semester/:semester_id");
        assert_eq!(r.params.get("semester_id"), Some("3"));

        assert!(table.resolve_direct(&Event::message(1, "grades")).is_none());
        assert!(table.resolve_direct(&Event::command(1, "/awaiting_login")).is_none());

        assert!(table.wants_state(&Event::message(1, "x")));
        assert!(table.wants_state(&Event::callback(1, "x")));
        assert!(!table.wants_state(&Event::command(1, "/x")));
        assert_eq!(
            table.resolve_state("awaiting_login").unwrap().namespace,
            Namespace::State
        );
        assert!(table.resolve_state("other").is_none());
    }
}
