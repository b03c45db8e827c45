//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, Uri};
use axum::Router;
use tokio::net::TcpListener;

use edge_router::Handler;

/// Serve `app` on an ephemeral local port.
pub async fn start_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

/// What a recording endpoint saw.
#[derive(Debug, Clone)]
pub struct Seen {
    pub uri: Uri,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn record(&self, req: &Request<Body>) {
        self.seen.lock().unwrap().push(Seen {
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        });
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Seen> {
        self.seen.lock().unwrap().last().cloned()
    }

    /// Terminal handler that records the request and answers `200 ok`.
    pub fn handler(&self) -> Handler {
        let recorder = self.clone();
        Handler::from_fn(move |req: Request<Body>| {
            recorder.record(&req);
            async { Response::new(Body::from("ok")) }
        })
    }
}

/// Query parameter value, decoded.
#[allow(dead_code)]
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
