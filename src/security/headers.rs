//! Hop-by-hop header sanitizing (RFC 7230 §6.1).
//!
//! # Responsibilities
//! - Remove every header named in `Connection` before a request is forwarded
//! - Keep protocol upgrades (`Connection: Upgrade` + `Upgrade`) working across
//!   the proxy hop
//!
//! # Design Decisions
//! - Runs first in every route chain, before anything that forwards headers
//! - Tokens are matched case-insensitively across all `Connection` lines

use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::http::Handler;
use crate::middleware::chain::{constructor, Constructor};

fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Strip hop-by-hop headers listed in `Connection`.
///
/// When `Connection` carries the `Upgrade` token and an `Upgrade` header is
/// present, the result keeps exactly `Connection: Upgrade` and the original
/// `Upgrade` value; otherwise `Connection` is removed too.
pub fn remove_connection_headers(headers: &mut HeaderMap) {
    // 1. Remember a requested protocol upgrade
    let upgrade: Option<HeaderValue> = if connection_tokens(headers)
        .any(|token| token.eq_ignore_ascii_case("upgrade"))
    {
        headers.get(UPGRADE).cloned()
    } else {
        None
    };

    // 2. Drop every header the client declared hop-by-hop
    let listed: Vec<String> = connection_tokens(headers).map(str::to_owned).collect();
    for token in listed {
        match HeaderName::from_bytes(token.as_bytes()) {
            Ok(name) => {
                headers.remove(name);
            }
            Err(_) => tracing::debug!(token = %token, "Ignoring invalid Connection token"),
        }
    }

    // 3. Restore the upgrade pair, or drop Connection entirely
    headers.remove(CONNECTION);
    if let Some(protocol) = upgrade {
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, protocol);
    }
}

/// Chain constructor that sanitizes request headers before calling the next handler.
pub fn connection_headers() -> Constructor {
    constructor(|next: Handler| {
        Ok(Handler::from_fn(move |mut req| {
            remove_connection_headers(req.headers_mut());
            next.serve(req)
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, Response};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_upgrade_survives() {
        let mut h = headers(&[
            ("connection", "Upgrade, foo"),
            ("upgrade", "test"),
            ("foo", "bar"),
        ]);
        remove_connection_headers(&mut h);

        assert_eq!(h.len(), 2);
        assert_eq!(h["upgrade"], "test");
        assert_eq!(h["connection"], "Upgrade");
        assert!(h.get("foo").is_none());
    }

    #[test]
    fn test_plain_connection_removed() {
        let mut h = headers(&[
            ("connection", "keep-alive, X-Hop"),
            ("keep-alive", "timeout=5"),
            ("x-hop", "1"),
            ("x-end-to-end", "1"),
        ]);
        remove_connection_headers(&mut h);

        assert_eq!(h.len(), 1);
        assert_eq!(h["x-end-to-end"], "1");
    }

    #[test]
    fn test_multiple_connection_lines() {
        let mut h = headers(&[
            ("connection", "foo"),
            ("connection", " UPGRADE , bar "),
            ("upgrade", "websocket"),
            ("foo", "1"),
            ("bar", "2"),
        ]);
        remove_connection_headers(&mut h);

        assert_eq!(h.len(), 2);
        assert_eq!(h["upgrade"], "websocket");
        assert_eq!(h["connection"], "Upgrade");
    }

    #[test]
    fn test_upgrade_token_without_upgrade_header() {
        let mut h = headers(&[("connection", "Upgrade"), ("accept", "*/*")]);
        remove_connection_headers(&mut h);

        assert_eq!(h.len(), 1);
        assert!(h.get("connection").is_none());
    }

    #[test]
    fn test_empty_tokens_ignored() {
        let mut h = headers(&[("connection", " , ,"), ("accept", "*/*")]);
        remove_connection_headers(&mut h);
        assert_eq!(h.len(), 1);
        assert_eq!(h["accept"], "*/*");
    }

    #[tokio::test]
    async fn test_constructor_sanitizes_before_next() {
        let handler = crate::middleware::Chain::new([connection_headers()])
            .then_fn(|req: Request<Body>| async move {
                let seen = req.headers().len().to_string();
                let leaked = req.headers().contains_key("foo");
                assert!(!leaked);
                Response::new(Body::from(seen))
            })
            .unwrap();

        let req = Request::builder()
            .header("connection", "foo")
            .header("foo", "bar")
            .header("accept", "*/*")
            .body(Body::empty())
            .unwrap();
        let resp = handler.serve(req).await;
        let body = axum::body::to_bytes(resp.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"1");
    }
}
