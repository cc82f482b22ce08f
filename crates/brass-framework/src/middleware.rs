//! Middleware chain for the Brass framework.
//!
//! A [`Middleware`] maps one [`BoxedHandlerService`] to another. Middleware
//! is attached globally on the router or per group, and is applied once per
//! route when the route table is built. For a list `[m1, m2, m3]` around a
//! handler `h` the resulting service is `m1(m2(m3(h)))`: `m1` runs first on
//! the way in and last on the way out.
//!
//! ```text
//!   event ──► m1 ──► m2 ──► m3 ──► h
//!   result ◄─ m1 ◄── m2 ◄── m3 ◄──┘
//! ```
//!
//! Built-ins:
//!
//! | Constructor | Behaviour |
//! |-------------|-----------|
//! | [`trace()`] | span per call, logs elapsed time and outcome |
//! | [`recover()`] | converts a handler panic into [`HandlerError::Panicked`] |
//! | [`rule()`] | short-circuits with [`EventSkipped`] when a predicate fails |
//! | [`from_layer()`] | wraps any tower [`Layer`] |
//! | [`from_fn()`] | wraps an async closure receiving the context and a [`Next`] |

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::Poll;
use std::time::Instant;

use futures::FutureExt;
use tower::filter::{FilterLayer, Predicate};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};
use tracing::{Instrument, Level, debug, span, trace as trace_event};

use crate::context::Context;
use crate::error::{BoxError, EventSkipped, HandlerError};
use crate::handler::{BoxFuture, BoxedHandlerService};

/// A reusable transformation of a handler service.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(BoxedHandlerService) -> BoxedHandlerService + Send + Sync>);

impl Middleware {
    /// Creates a middleware from a service-mapping function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(BoxedHandlerService) -> BoxedHandlerService + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wraps `inner` with this middleware.
    pub fn apply(&self, inner: BoxedHandlerService) -> BoxedHandlerService {
        (self.0)(inner)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Wraps `service` in `chain` so that the first element is outermost.
pub fn compose(chain: &[Middleware], service: BoxedHandlerService) -> BoxedHandlerService {
    chain
        .iter()
        .rev()
        .fold(service, |inner, middleware| middleware.apply(inner))
}

// ============================================================================
// from_layer
// ============================================================================

/// Turns any tower [`Layer`] over handler services into a [`Middleware`].
///
/// ```rust,ignore
/// router.use_middleware(from_layer(tower::timeout::TimeoutLayer::new(Duration::from_secs(5))));
/// ```
pub fn from_layer<L>(layer: L) -> Middleware
where
    L: Layer<BoxedHandlerService> + Send + Sync + 'static,
    L::Service: Service<Arc<Context>, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
    <L::Service as Service<Arc<Context>>>::Future: Send + 'static,
{
    Middleware::new(move |inner| BoxCloneSyncService::new(layer.layer(inner)))
}

// ============================================================================
// from_fn
// ============================================================================

/// The rest of the chain, handed to [`from_fn`] middleware.
pub struct Next {
    inner: BoxedHandlerService,
}

impl Next {
    /// Runs the remaining middleware and the handler.
    pub async fn run(self, ctx: Arc<Context>) -> Result<(), BoxError> {
        self.inner.oneshot(ctx).await
    }
}

/// Creates a middleware from an async closure.
///
/// The closure decides whether and when to call the rest of the chain;
/// returning without calling [`Next::run`] short-circuits the event.
///
/// ```rust,ignore
/// let only_admins = from_fn(|ctx: Arc<Context>, next: Next| async move {
///     if ctx.user_id() == ADMIN {
///         next.run(ctx).await
///     } else {
///         Ok(())
///     }
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Arc<Context>, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Middleware::new(move |inner| {
        BoxCloneSyncService::new(FromFnService {
            f: f.clone(),
            inner,
        })
    })
}

#[derive(Clone)]
struct FromFnService<F> {
    f: F,
    inner: BoxedHandlerService,
}

impl<F, Fut> Service<Arc<Context>> for FromFnService<F>
where
    F: Fn(Arc<Context>, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let next = Next {
            inner: self.inner.clone(),
        };
        Box::pin((self.f)(ctx, next))
    }
}

// ============================================================================
// trace
// ============================================================================

/// Logs every call with its route, user and elapsed time.
pub fn trace() -> Middleware {
    from_layer(TraceLayer)
}

/// Layer behind [`trace()`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService { inner }
    }
}

/// Service produced by [`TraceLayer`].
#[derive(Debug, Clone)]
pub struct TraceService<S> {
    inner: S,
}

impl<S> Service<Arc<Context>> for TraceService<S>
where
    S: Service<Arc<Context>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<Result<(), BoxError>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let span = span!(
            Level::DEBUG,
            "handler",
            namespace = %ctx.namespace(),
            route = %ctx.route(),
            user = %ctx.user_id(),
        );
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.call(ctx).await;
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

                match &result {
                    Ok(()) => debug!(elapsed_ms, "Handler finished"),
                    Err(e) if e.is::<EventSkipped>() => {
                        trace_event!(elapsed_ms, "Handler skipped by rule")
                    }
                    // The dispatcher reports the failure itself.
                    Err(e) => debug!(elapsed_ms, error = %e, "Handler returned an error"),
                }
                result
            }
            .instrument(span),
        )
    }
}

// ============================================================================
// recover
// ============================================================================

/// Converts a panic anywhere inside the wrapped chain into
/// [`HandlerError::Panicked`].
pub fn recover() -> Middleware {
    from_layer(RecoverLayer)
}

/// Layer behind [`recover()`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverLayer;

impl<S> Layer<S> for RecoverLayer {
    type Service = RecoverService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoverService { inner }
    }
}

/// Service produced by [`RecoverLayer`].
#[derive(Debug, Clone)]
pub struct RecoverService<S> {
    inner: S,
}

impl<S> Service<Arc<Context>> for RecoverService<S>
where
    S: Service<Arc<Context>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<Result<(), BoxError>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let route = ctx.route().to_string();
            let user = ctx.user_id();
            match AssertUnwindSafe(async move { inner.call(ctx).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    debug!(%route, %user, panic = %message, "Handler panicked");
                    Err(HandlerError::Panicked(message).into())
                }
            }
        })
    }
}

/// Extracts the message of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// rule
// ============================================================================

/// A type-erased [`Predicate`] over the context.
///
/// When the inner closure returns `false` the request is rejected with
/// [`EventSkipped`].
#[derive(Clone)]
pub struct EventPredicate(Arc<dyn Fn(&Context) -> bool + Send + Sync>);

impl EventPredicate {
    /// Creates a new `EventPredicate` from a synchronous closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl Predicate<Arc<Context>> for EventPredicate {
    type Request = Arc<Context>;

    fn check(&mut self, request: Arc<Context>) -> Result<Arc<Context>, BoxError> {
        if (self.0)(&request) {
            Ok(request)
        } else {
            Err(Box::new(EventSkipped))
        }
    }
}

/// Lets an event through only when `predicate` holds.
///
/// ```rust,ignore
/// let private_only = rule(|ctx| ctx.chat_id() == ctx.user_id().get());
/// ```
pub fn rule<F>(predicate: F) -> Middleware
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    from_layer(FilterLayer::new(EventPredicate::new(predicate)))
}
