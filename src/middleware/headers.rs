//! Custom request/response headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

use crate::http::Handler;
use crate::middleware::chain::{constructor, Constructor};
use crate::middleware::BuildError;

/// Validated custom header rules. `None` deletes the header.
#[derive(Debug, Clone, Default)]
pub struct CustomHeaders {
    rules: Vec<(HeaderName, Option<HeaderValue>)>,
}

impl CustomHeaders {
    /// Compile a name → value map. An empty value means "delete".
    pub fn compile(map: &BTreeMap<String, String>) -> Result<Self, BuildError> {
        let mut rules = Vec::with_capacity(map.len());
        for (name, raw) in map {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                BuildError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let value = if raw.is_empty() {
                None
            } else {
                Some(HeaderValue::from_str(raw).map_err(|e| BuildError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?)
            };
            rules.push((header, value));
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.rules {
            match value {
                Some(v) => {
                    headers.insert(name.clone(), v.clone());
                }
                None => {
                    headers.remove(name);
                }
            }
        }
    }
}

/// Request side of a `headers` middleware.
///
/// The response side (custom response headers, security headers) is built by
/// the response modifier composer.
pub fn request_headers(rules: CustomHeaders) -> Constructor {
    constructor(move |next: Handler| {
        if rules.is_empty() {
            return Ok(next);
        }
        let rules = rules.clone();
        Ok(Handler::from_fn(move |mut req| {
            rules.apply(req.headers_mut());
            next.serve(req)
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use axum::body::Body;
    use axum::http::{Request, Response};

    fn rules(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_value_deletes() {
        let custom = CustomHeaders::compile(&rules(&[("X-Demo", ""), ("X-New", "1")])).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-demo", HeaderValue::from_static("old"));
        custom.apply(&mut headers);

        assert!(headers.get("x-demo").is_none());
        assert_eq!(headers["x-new"], "1");
    }

    #[test]
    fn test_invalid_header_name() {
        let err = CustomHeaders::compile(&rules(&[("bad header", "1")])).unwrap_err();
        assert!(matches!(err, BuildError::InvalidHeader { ref name, .. } if name == "bad header"));
    }

    #[tokio::test]
    async fn test_request_headers_applied_before_next() {
        let custom = CustomHeaders::compile(&rules(&[("X-Script-Name", "test"), ("Cookie", "")]))
            .unwrap();
        let handler = Chain::new([request_headers(custom)])
            .then_fn(|req: Request<Body>| async move {
                assert!(req.headers().get("cookie").is_none());
                Response::new(Body::from(req.headers()["x-script-name"].as_bytes().to_vec()))
            })
            .unwrap();

        let req = Request::builder()
            .header("cookie", "session=1")
            .body(Body::empty())
            .unwrap();
        let body = axum::body::to_bytes(handler.serve(req).await.into_body(), 64)
            .await
            .unwrap();
        assert_eq!(&body[..], b"test");
    }
}
