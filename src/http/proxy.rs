//! Upstream forwarding.
//!
//! # Responsibilities
//! - Terminal handler of every route chain
//! - Rewrite the request URI to the service's authority, flattening its host
//!   through the CNAME resolver when enabled
//! - Apply the route's response modifier before the response leaves
//!
//! # Design Decisions
//! - The inbound `Host` header is passed through untouched
//! - A modifier failure replaces the upstream response with `500`; a transport
//!   failure becomes `502`

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::config::ServiceConfig;
use crate::http::{Handler, ResponseModifier};
use crate::middleware::BuildError;
use crate::observability::metrics;
use crate::resolver::HostResolver;

/// Shared upstream HTTP client.
pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Forwards requests to one service.
pub struct Forwarder {
    route: String,
    host: String,
    port: u16,
    flatten: bool,
    client: HttpClient,
    modifier: ResponseModifier,
    resolver: Arc<HostResolver>,
}

impl Forwarder {
    pub fn new(
        route: &str,
        service: &ServiceConfig,
        modifier: ResponseModifier,
        resolver: Arc<HostResolver>,
        client: HttpClient,
    ) -> Result<Self, BuildError> {
        let invalid = || BuildError::InvalidAddress {
            address: service.url.clone(),
        };
        let url = Url::parse(&service.url).map_err(|_| invalid())?;
        if url.scheme() != "http" {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?.to_string();
        let flatten = matches!(url.host(), Some(url::Host::Domain(_)));

        Ok(Self {
            route: route.to_string(),
            host,
            port: url.port_or_known_default().unwrap_or(80),
            flatten,
            client,
            modifier,
            resolver,
        })
    }

    pub fn into_handler(self) -> Handler {
        let forwarder = Arc::new(self);
        Handler::from_fn(move |req| {
            let forwarder = forwarder.clone();
            async move { forwarder.forward(req).await }
        })
    }

    async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().to_string();

        // 1. Resolve the upstream host
        let target = if self.flatten {
            self.resolver.resolve(&self.host).await.1
        } else {
            self.host.clone()
        };

        // 2. Rewrite the URI, keeping what the client asked for in `Host`
        let (mut parts, body) = req.into_parts();
        if !parts.headers.contains_key(header::HOST) {
            if let Some(value) = parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            {
                parts.headers.insert(header::HOST, value);
            }
        }
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        parts.uri = match Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(format!("{}:{}", target, self.port))
            .path_and_query(path_and_query)
            .build()
        {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(route = %self.route, target = %target, error = %e, "Invalid upstream URI");
                return self.fail(&method, StatusCode::INTERNAL_SERVER_ERROR, start);
            }
        };

        tracing::debug!(route = %self.route, uri = %parts.uri, "Forwarding request");

        // 3. Forward
        let mut response = match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => response.map(Body::new),
            Err(e) => {
                tracing::error!(route = %self.route, error = %e, "Upstream error");
                return self.fail(&method, StatusCode::BAD_GATEWAY, start);
            }
        };

        // 4. Modify
        if let Err(e) = self.modifier.apply(&mut response) {
            tracing::error!(route = %self.route, error = %e, "Response modification failed");
            return self.fail(&method, StatusCode::INTERNAL_SERVER_ERROR, start);
        }

        metrics::record_request(&self.route, &method, response.status().as_u16(), start);
        response
    }

    fn fail(&self, method: &str, status: StatusCode, start: Instant) -> Response<Body> {
        metrics::record_request(&self.route, method, status.as_u16(), start);
        let mut response = Response::new(Body::from(
            status.canonical_reason().unwrap_or_default().to_string(),
        ));
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::http::ModifierError;

    fn resolver() -> Arc<HostResolver> {
        Arc::new(HostResolver::new(&ResolverConfig::default()))
    }

    fn service(url: &str) -> ServiceConfig {
        ServiceConfig { url: url.to_string() }
    }

    #[tokio::test]
    async fn test_rejects_non_http_service() {
        let err = Forwarder::new(
            "web",
            &service("https://example.com"),
            ResponseModifier::noop(),
            resolver(),
            http_client(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, BuildError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_is_bad_gateway() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let handler = Forwarder::new(
            "web",
            &service(&format!("http://{addr}")),
            ResponseModifier::noop(),
            resolver(),
            http_client(),
        )
        .unwrap()
        .into_handler();

        let resp = handler.serve(Request::new(Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_modifier_error_is_server_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().fallback(|| async { "upstream" });
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let handler = Forwarder::new(
            "web",
            &service(&format!("http://{addr}")),
            ResponseModifier::new(|_| Err(ModifierError("nope".into()))),
            resolver(),
            http_client(),
        )
        .unwrap()
        .into_handler();

        let resp = handler.serve(Request::new(Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
