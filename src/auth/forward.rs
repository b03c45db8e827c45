//! Forward authentication middleware.
//!
//! # Responsibilities
//! - Stage configured request values (headers, query parameters) for the auth call
//! - Ask the auth server with `GET <address>` carrying the inbound headers
//! - On 2xx: replay configured JSON fields onto the request and call the next handler
//! - Otherwise: answer the client with the auth server's response
//!
//! # Design Decisions
//! - Fail closed: transport errors, unreadable bodies and non-JSON bodies (when
//!   replay fields are configured) never reach the next handler
//! - Redirects from the auth server are answers, not something to follow
//! - The inbound request is mutated in place (extracted and replayed values)

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{CONTENT_LENGTH, HOST, LOCATION, SET_COOKIE, TRANSFER_ENCODING};
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri};
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::config::{ClientTlsConfig, ForwardAuthConfig, ParamLocation};
use crate::http::Handler;
use crate::middleware::chain::{constructor, Constructor};
use crate::middleware::BuildError;
use crate::observability::metrics;
use crate::security::headers::remove_connection_headers;

const X_FORWARDED_METHOD: HeaderName = HeaderName::from_static("x-forwarded-method");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_URI: HeaderName = HeaderName::from_static("x-forwarded-uri");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Where a staged or replayed value is written.
#[derive(Debug, Clone)]
enum Target {
    Header(HeaderName),
    Query(String),
}

impl Target {
    fn compile(location: ParamLocation, name: &str) -> Result<Self, BuildError> {
        match location {
            ParamLocation::Header => HeaderName::from_bytes(name.as_bytes())
                .map(Target::Header)
                .map_err(|e| BuildError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
            ParamLocation::Query => Ok(Target::Query(name.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
struct Extraction {
    from: ParamLocation,
    name: String,
    target: Target,
}

#[derive(Debug, Clone)]
struct Replay {
    pointer: String,
    target: Target,
}

/// A configured forward auth delegate.
#[derive(Debug)]
pub struct ForwardAuth {
    name: String,
    address: Url,
    client: reqwest::Client,
    trust_forward_header: bool,
    auth_response_headers: Vec<HeaderName>,
    extractions: Vec<Extraction>,
    replays: Vec<Replay>,
}

impl ForwardAuth {
    /// Validate the configuration and build the HTTP client.
    pub fn new(name: &str, config: &ForwardAuthConfig) -> Result<Self, BuildError> {
        let address = Url::parse(&config.address).map_err(|_| BuildError::InvalidAddress {
            address: config.address.clone(),
        })?;

        let client = build_client(config.tls.as_ref(), Duration::from_secs(config.timeout_secs))?;

        let auth_response_headers = config
            .auth_response_headers
            .iter()
            .map(|h| {
                HeaderName::from_bytes(h.as_bytes()).map_err(|e| BuildError::InvalidHeader {
                    name: h.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let extractions = config
            .request_parameters
            .values()
            .map(|p| {
                Ok(Extraction {
                    from: p.from,
                    name: p.name.clone(),
                    target: Target::compile(p.to_location, p.destination())?,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        let replays = config
            .response_replay
            .values()
            .map(|r| {
                Ok(Replay {
                    pointer: json_pointer(&r.path),
                    target: Target::compile(r.location, &r.to)?,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        Ok(Self {
            name: name.to_string(),
            address,
            client,
            trust_forward_header: config.trust_forward_header,
            auth_response_headers,
            extractions,
            replays,
        })
    }

    /// Wrap `next` behind this delegate.
    pub fn wrap(self: Arc<Self>, next: Handler) -> Handler {
        Handler::from_fn(move |req| {
            let auth = self.clone();
            let next = next.clone();
            async move { auth.handle(req, &next).await }
        })
    }

    async fn handle(&self, mut req: Request<Body>, next: &Handler) -> Response<Body> {
        // 1. Extract
        let (staged_headers, staged_query) = self.extract(&req);

        // 2. Call the auth server
        let mut url = self.address.clone();
        if !staged_query.is_empty() {
            url.query_pairs_mut().extend_pairs(staged_query.iter());
        }

        let mut headers = req.headers().clone();
        for name in [HOST, CONTENT_LENGTH, TRANSFER_ENCODING] {
            headers.remove(name);
        }
        remove_connection_headers(&mut headers);
        self.write_forwarded_headers(&req, &mut headers);
        for (name, value) in staged_headers {
            headers.insert(name, value);
        }

        let auth_response = match self.client.get(url).headers(headers).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(middleware = %self.name, error = %e, "Error calling forward auth server");
                metrics::record_forward_auth(&self.name, "error");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let status = auth_response.status();
        let auth_headers = auth_response.headers().clone();
        let body = match auth_response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(middleware = %self.name, error = %e, "Error reading forward auth response body");
                metrics::record_forward_auth(&self.name, "error");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        // 3a. Deny: the auth server's answer goes to the client verbatim
        if !status.is_success() {
            tracing::debug!(middleware = %self.name, status = %status, "Forward auth denied request");
            metrics::record_forward_auth(&self.name, "deny");

            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            if let Some(location) = auth_headers.get(LOCATION) {
                response.headers_mut().insert(LOCATION, location.clone());
            }
            for cookie in auth_headers.get_all(SET_COOKIE) {
                response.headers_mut().append(SET_COOKIE, cookie.clone());
            }
            return response;
        }

        // 3b. Allow: replay onto the original request
        for name in &self.auth_response_headers {
            req.headers_mut().remove(name);
            for value in auth_headers.get_all(name) {
                req.headers_mut().append(name.clone(), value.clone());
            }
        }

        if !self.replays.is_empty() {
            let json: Value = match serde_json::from_slice(&body) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(middleware = %self.name, error = %e, "Forward auth response is not valid JSON, denying");
                    metrics::record_forward_auth(&self.name, "deny");
                    return status_response(StatusCode::FORBIDDEN);
                }
            };

            if let Err(e) = self.replay(&json, &mut req) {
                tracing::error!(middleware = %self.name, error = %e, "Failed to rewrite request URI");
                metrics::record_forward_auth(&self.name, "error");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }

        tracing::debug!(middleware = %self.name, "Forward auth allowed request");
        metrics::record_forward_auth(&self.name, "allow");
        next.serve(req).await
    }

    fn extract(&self, req: &Request<Body>) -> (Vec<(HeaderName, HeaderValue)>, Vec<(String, String)>) {
        let mut headers = Vec::new();
        let mut query = Vec::new();

        for extraction in &self.extractions {
            let value = match extraction.from {
                ParamLocation::Header => req
                    .headers()
                    .get(extraction.name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
                ParamLocation::Query => query_value(req.uri(), &extraction.name),
            };
            // Absent sources are omitted.
            let Some(value) = value else {
                continue;
            };

            match &extraction.target {
                Target::Header(name) => match HeaderValue::from_str(&value) {
                    Ok(v) => headers.push((name.clone(), v)),
                    Err(_) => {
                        tracing::debug!(middleware = %self.name, parameter = %extraction.name, "Skipping value not valid as header")
                    }
                },
                Target::Query(name) => query.push((name.clone(), value)),
            }
        }

        (headers, query)
    }

    fn write_forwarded_headers(&self, req: &Request<Body>, headers: &mut HeaderMap) {
        let client_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let computed = [
            (X_FORWARDED_METHOD, Some(req.method().as_str().to_string())),
            (
                X_FORWARDED_PROTO,
                Some(req.uri().scheme_str().unwrap_or("http").to_string()),
            ),
            (
                X_FORWARDED_HOST,
                req.headers()
                    .get(HOST)
                    .and_then(|h| h.to_str().ok())
                    .or_else(|| req.uri().authority().map(|a| a.as_str()))
                    .map(str::to_owned),
            ),
            (
                X_FORWARDED_URI,
                req.uri().path_and_query().map(|pq| pq.as_str().to_string()),
            ),
            (X_FORWARDED_FOR, client_ip),
        ];

        for (name, value) in computed {
            if self.trust_forward_header && headers.contains_key(&name) {
                continue;
            }
            headers.remove(&name);
            if let Some(v) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                headers.insert(name, v);
            }
        }
    }

    fn replay(&self, json: &Value, req: &mut Request<Body>) -> Result<(), axum::http::Error> {
        let mut query = Vec::new();

        for replay in &self.replays {
            let Some(value) = json.pointer(&replay.pointer).and_then(json_value_to_string) else {
                continue;
            };
            match &replay.target {
                Target::Header(name) => match HeaderValue::from_str(&value) {
                    Ok(v) => {
                        req.headers_mut().insert(name.clone(), v);
                    }
                    Err(_) => {
                        tracing::debug!(middleware = %self.name, header = %name, "Skipping replayed value not valid as header")
                    }
                },
                Target::Query(name) => query.push((name.clone(), value)),
            }
        }

        if !query.is_empty() {
            let uri = set_query_params(req.uri(), &query)?;
            *req.uri_mut() = uri;
        }
        Ok(())
    }
}

/// Chain constructor for a forward auth middleware.
pub fn forward_auth(name: &str, config: &ForwardAuthConfig) -> Result<Constructor, BuildError> {
    let auth = Arc::new(ForwardAuth::new(name, config)?);
    Ok(constructor(move |next| Ok(auth.clone().wrap(next))))
}

fn build_client(
    tls: Option<&ClientTlsConfig>,
    timeout: Duration,
) -> Result<reqwest::Client, BuildError> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .no_proxy();

    if let Some(tls) = tls {
        builder = builder.use_rustls_tls();

        if let Some(ca) = &tls.ca {
            for cert in reqwest::Certificate::from_pem_bundle(&read_pem(ca)?)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
            let mut pem = read_pem(cert)?;
            pem.extend(read_pem(key)?);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    Ok(builder.build()?)
}

fn read_pem(path: &str) -> Result<Vec<u8>, BuildError> {
    fs::read(path).map_err(|source| BuildError::TlsFile {
        path: path.to_string(),
        source,
    })
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::from(status.canonical_reason().unwrap_or_default()));
    *response.status_mut() = status;
    response
}

/// Dotted path (`user.id`) to JSON pointer (`/user/id`).
fn json_pointer(path: &str) -> String {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect()
}

fn json_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn query_value(uri: &Uri, name: &str) -> Option<String> {
    form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Set query parameters on a URI, replacing any existing values of the same names.
fn set_query_params(uri: &Uri, params: &[(String, String)]) -> Result<Uri, axum::http::Error> {
    let replaced: HashSet<&str> = params.iter().map(|(k, _)| k.as_str()).collect();

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if let Some(query) = uri.query() {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if !replaced.contains(key.as_ref()) {
                serializer.append_pair(&key, &value);
            }
        }
    }
    for (key, value) in params {
        serializer.append_pair(key, value);
    }

    let path_and_query = format!("{}?{}", uri.path(), serializer.finish());
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query)?);
    Ok(Uri::from_parts(parts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_pointer() {
        assert_eq!(json_pointer("user.id"), "/user/id");
        assert_eq!(json_pointer("groups.0"), "/groups/0");
        assert_eq!(json_pointer("a/b"), "/a~1b");
    }

    #[test]
    fn test_json_value_to_string() {
        let doc = json!({"user": {"id": 100, "name": "John Lennon", "admin": false, "gone": null}});
        let get = |path: &str| doc.pointer(&json_pointer(path)).and_then(json_value_to_string);

        assert_eq!(get("user.id").as_deref(), Some("100"));
        assert_eq!(get("user.name").as_deref(), Some("John Lennon"));
        assert_eq!(get("user.admin").as_deref(), Some("false"));
        assert_eq!(get("user.gone"), None);
        assert_eq!(get("user.missing"), None);
    }

    #[test]
    fn test_set_query_params_replaces_and_keeps() {
        let uri: Uri = "/path?keep=1&name=old".parse().unwrap();
        let updated = set_query_params(&uri, &[("name".into(), "John Lennon".into())]).unwrap();

        assert_eq!(updated.path(), "/path");
        assert_eq!(query_value(&updated, "keep").as_deref(), Some("1"));
        assert_eq!(query_value(&updated, "name").as_deref(), Some("John Lennon"));
    }

    #[test]
    fn test_set_query_params_absolute_uri() {
        let uri: Uri = "http://example.com/a".parse().unwrap();
        let updated = set_query_params(&uri, &[("x".into(), "1".into())]).unwrap();
        assert_eq!(updated.to_string(), "http://example.com/a?x=1");
    }

    #[test]
    fn test_invalid_replay_header_rejected_at_build() {
        let mut config: ForwardAuthConfig = serde_json::from_value(json!({
            "address": "http://127.0.0.1:1/auth"
        }))
        .unwrap();
        config.response_replay.insert(
            "bad".into(),
            crate::config::ReplayField {
                path: "user.id".into(),
                to: "bad header".into(),
                location: ParamLocation::Header,
            },
        );
        let err = ForwardAuth::new("auth", &config).unwrap_err();
        assert!(matches!(err, BuildError::InvalidHeader { .. }));
    }

    #[test]
    fn test_missing_tls_file_rejected_at_build() {
        let config: ForwardAuthConfig = serde_json::from_value(json!({
            "address": "https://127.0.0.1:1/auth",
            "tls": {"ca": "/nonexistent/ca.pem"}
        }))
        .unwrap();
        let err = ForwardAuth::new("auth", &config).unwrap_err();
        assert!(matches!(err, BuildError::TlsFile { ref path, .. } if path == "/nonexistent/ca.pem"));
    }
}
