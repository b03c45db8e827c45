//! The request handler unit installed per route.
//!
//! A [`Handler`] is a cheaply cloneable, shareable async function from request to
//! response. Middlewares wrap one handler into another; the finished handler is
//! immutable and shared read only across all concurrent requests on a route.
//! It implements `tower::Service`, so it mounts directly into an axum router.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use tower::Service;

type HandlerFn = dyn Fn(Request<Body>) -> BoxFuture<'static, Response<Body>> + Send + Sync;

/// A shareable request handler.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    /// Wrap an async function.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |req| -> BoxFuture<'static, Response<Body>> {
                Box::pin(f(req))
            }),
        }
    }

    /// Handler used when a chain is finished without a terminal: empty `200 OK`.
    pub fn noop() -> Self {
        Self::from_fn(|_req| async { Response::new(Body::empty()) })
    }

    /// Handle one request.
    pub fn serve(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        (self.inner)(req)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl Service<Request<Body>> for Handler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let fut = self.serve(req);
        Box::pin(async move { Ok(fut.await) })
    }
}
