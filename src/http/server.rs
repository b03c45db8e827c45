//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router and wire up tracing
//! - Dispatch every request to the route handler matching its `Host`
//! - Serve with client addresses attached, until shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::observability::metrics;
use crate::routing::RouteTable;

/// HTTP server for the edge router.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self {
            router: Self::build_router(table),
        }
    }

    fn build_router(table: Arc<RouteTable>) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(table)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch(State(table): State<Arc<RouteTable>>, request: Request<Body>) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
        .to_string();

    match table.handler_for(&host) {
        Some(handler) => handler.serve(request).await,
        None => {
            tracing::warn!(host = %host, path = %request.uri().path(), "No route matched");
            metrics::record_request("none", request.method().as_str(), 404, Instant::now());
            (StatusCode::NOT_FOUND, "No matching route found").into_response()
        }
    }
}
