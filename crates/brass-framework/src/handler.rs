//! Handler system for the Brass framework.
//!
//! Handlers are plain async functions. Their parameters are extracted from
//! the [`Context`] through [`FromContext`], and they return either `()` or
//! `Result<(), E>` for any `E: Into<BoxError>`:
//!
//! ```rust,ignore
//! async fn start() {}
//!
//! async fn echo(Text(text): Text, ctx: Arc<Context>) -> Result<(), BoxError> {
//!     ctx.set_data("last", &text).await?;
//!     Ok(())
//! }
//!
//! async fn semester(Param(id): Param<u32>, user: UserId) {
//!     tracing::info!(%user, id, "Semester picked");
//! }
//! ```
//!
//! [`Handler`] is implemented for such functions of up to 16 parameters by a
//! blanket implementation per arity. [`HandlerService`] turns one handler
//! into a `tower::Service`, which is what middleware wraps.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::context::Context;
use crate::error::BoxError;
use crate::extractor::FromContext;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A type-erased, `Clone + Send + Sync` service processing one event.
///
/// This is the unit the middleware chain composes: a [`HandlerService`] is
/// boxed into it, and every [`Middleware`](crate::middleware::Middleware)
/// maps one of these into another.
pub type BoxedHandlerService = BoxCloneSyncService<Arc<Context>, (), BoxError>;

// ============================================================================
// HandlerResponse
// ============================================================================

/// The return type of a handler.
pub trait HandlerResponse: Send + 'static {
    /// Converts the return value into the outcome of the call.
    fn into_result(self) -> Result<(), BoxError>;
}

impl HandlerResponse for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> HandlerResponse for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler
// ============================================================================

/// An event handler.
///
/// Implemented for async functions whose parameters all implement
/// [`FromContext`] and whose output implements [`HandlerResponse`]. When a
/// parameter fails to extract the function is not called and the extraction
/// error becomes the result.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = Result<(), BoxError>> + Send + 'static;

    /// Calls the handler with the given context.
    fn call(self, ctx: Arc<Context>) -> Self::Future;
}

impl<F, Fut> Handler<()> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResponse,
{
    type Future = BoxFuture<Result<(), BoxError>>;

    fn call(self, _ctx: Arc<Context>) -> Self::Future {
        Box::pin(async move { (self)().await.into_result() })
    }
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case)]
        impl<F, Fut, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future + Send + 'static,
            Fut::Output: HandlerResponse,
            $( $ty: FromContext + Send + 'static, )*
        {
            type Future = BoxFuture<Result<(), BoxError>>;

            fn call(self, ctx: Arc<Context>) -> Self::Future {
                Box::pin(async move {
                    $(
                        let $ty = $ty::from_context(&ctx)?;
                    )*

                    (self)($($ty,)*).await.into_result()
                })
            }
        }
    };
}

impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15
);
impl_handler!(
    T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12, T13, T14, T15, T16
);

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single handler.
pub struct HandlerService<H, T> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<H: Clone, T> Clone for HandlerService<H, T> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, T> HandlerService<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    /// Wraps `handler` in a `HandlerService`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }

    /// Erases the handler type.
    pub fn boxed(self) -> BoxedHandlerService {
        BoxCloneSyncService::new(self)
    }
}

impl<H, T> Service<Arc<Context>> for HandlerService<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = H::Future;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        self.handler.clone().call(ctx)
    }
}

/// Boxes a handler function into a [`BoxedHandlerService`].
pub fn into_service<H, T>(handler: H) -> BoxedHandlerService
where
    H: Handler<T>,
    T: 'static,
{
    HandlerService::new(handler).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use brass_core::{Event, MemoryStore, UserId};
    use tower::ServiceExt;

    use crate::error::ExtractError;
    use crate::extractor::{CommandArgs, Text};
    use crate::path::Params;
    use crate::router::Namespace;

    fn ctx(event: Event) -> Arc<Context> {
        Arc::new(Context::new(
            event,
            Namespace::Command,
            "start",
            Params::new(),
            Arc::new(MemoryStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_unit_and_result_handlers() {
        async fn unit() {}
        async fn ok(_: UserId) -> Result<(), BoxError> {
            Ok(())
        }
        async fn fails(Text(text): Text) -> Result<(), std::io::Error> {
            Err(std::io::Error::other(text))
        }

        assert!(into_service(unit).oneshot(ctx(Event::command(1, "/start"))).await.is_ok());
        assert!(into_service(ok).oneshot(ctx(Event::command(1, "/start"))).await.is_ok());

        let err = into_service(fails)
            .oneshot(ctx(Event::command(1, "/start boom")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "/start boom");
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_call() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        async fn needs_args(_: CommandArgs) {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let err = into_service(needs_args)
            .oneshot(ctx(Event::message(1, "hi")))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ExtractError>().is_some());
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let svc = into_service(move |ctx: Arc<Context>| {
            let counter = counter.clone();
            async move {
                assert_eq!(ctx.route(), "start");
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        svc.clone().oneshot(ctx(Event::command(1, "/start"))).await.unwrap();
        svc.oneshot(ctx(Event::command(2, "/start"))).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
