//! Ordered middleware chains.
//!
//! # Responsibilities
//! - Hold an ordered list of constructors (`Handler -> Result<Handler>`)
//! - Compose them around a terminal handler in declared order
//!
//! # Design Decisions
//! - `Chain::new(m1, m2, m3).then(h)` is `m1(m2(m3(h)))`: constructors are applied
//!   last to first, so `m1` is the first wrapper a request meets
//! - Chains are immutable values; `append`/`extend` return new chains, so a base
//!   chain can be shared and extended from many tasks without locking
//! - The first failing constructor aborts `then`; no partial handler escapes

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};

use crate::http::Handler;
use crate::middleware::BuildError;

/// Wraps the next handler into a new one.
pub type Constructor = Arc<dyn Fn(Handler) -> Result<Handler, BuildError> + Send + Sync>;

/// Box a closure into a [`Constructor`].
pub fn constructor<F>(f: F) -> Constructor
where
    F: Fn(Handler) -> Result<Handler, BuildError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An immutable, ordered list of middleware constructors.
#[derive(Clone, Default)]
pub struct Chain {
    constructors: Vec<Constructor>,
}

impl Chain {
    /// Create a chain from constructors, outermost first.
    pub fn new(constructors: impl IntoIterator<Item = Constructor>) -> Self {
        Self {
            constructors: constructors.into_iter().collect(),
        }
    }

    /// Compose the chain around `terminal`.
    ///
    /// `None` stands for the default no-op handler.
    pub fn then(&self, terminal: Option<Handler>) -> Result<Handler, BuildError> {
        let mut handler = terminal.unwrap_or_else(Handler::noop);
        for construct in self.constructors.iter().rev() {
            handler = construct(handler)?;
        }
        Ok(handler)
    }

    /// Like [`Chain::then`] with an async function as terminal.
    pub fn then_fn<F, Fut>(&self, f: F) -> Result<Handler, BuildError>
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        self.then(Some(Handler::from_fn(f)))
    }

    /// New chain with `constructors` added after this chain's own.
    pub fn append(&self, constructors: impl IntoIterator<Item = Constructor>) -> Chain {
        let mut all = self.constructors.clone();
        all.extend(constructors);
        Chain { constructors: all }
    }

    /// New chain with every constructor of `other` added after this chain's own.
    pub fn extend(&self, other: &Chain) -> Chain {
        self.append(other.constructors.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("constructors", &self.constructors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn push_tag(headers: &mut HeaderMap, name: &'static str, tag: &str) {
        let value = match headers.get(name).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{},{}", existing, tag),
            None => tag.to_string(),
        };
        headers.insert(name, HeaderValue::from_str(&value).unwrap());
    }

    fn tag_handler(tag: &'static str, next: Handler) -> Handler {
        Handler::from_fn(move |mut req: Request<Body>| {
            let next = next.clone();
            async move {
                push_tag(req.headers_mut(), "x-trace", tag);
                let mut resp = next.serve(req).await;
                push_tag(resp.headers_mut(), "x-unwind", tag);
                resp
            }
        })
    }

    fn tagger(tag: &'static str) -> Constructor {
        constructor(move |next| Ok(tag_handler(tag, next)))
    }

    fn echo_trace() -> Handler {
        Handler::from_fn(|req: Request<Body>| async move {
            let trace = req
                .headers()
                .get("x-trace")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Response::new(Body::from(trace))
        })
    }

    async fn run(handler: &Handler) -> (String, String) {
        let resp = handler.serve(Request::new(Body::empty())).await;
        let unwind = resp.headers()["x-unwind"].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        (String::from_utf8(body.to_vec()).unwrap(), unwind)
    }

    #[tokio::test]
    async fn test_then_matches_explicit_nesting() {
        let chained = Chain::new([tagger("m1"), tagger("m2"), tagger("m3")])
            .then(Some(echo_trace()))
            .unwrap();
        let nested = tag_handler("m1", tag_handler("m2", tag_handler("m3", echo_trace())));

        let from_chain = run(&chained).await;
        assert_eq!(from_chain, ("m1,m2,m3".to_string(), "m3,m2,m1".to_string()));
        assert_eq!(from_chain, run(&nested).await);
    }

    #[tokio::test]
    async fn test_none_terminal_is_noop() {
        let handler = Chain::new([tagger("only")]).then(None).unwrap();
        let resp = handler.serve(Request::new(Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-unwind"], "only");
    }

    #[test]
    fn test_append_and_extend_do_not_mutate() {
        let base = Chain::new([tagger("a"), tagger("b")]);
        let appended = base.append([tagger("c")]);
        let extended = base.extend(&Chain::new([tagger("d"), tagger("e")]));

        assert_eq!(base.len(), 2);
        assert_eq!(appended.len(), 3);
        assert_eq!(extended.len(), 4);
    }

    #[tokio::test]
    async fn test_derived_chains_from_many_tasks() {
        let base = Chain::new([tagger("base")]);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let base = base.clone();
            tasks.push(tokio::spawn(async move {
                let derived = base.append([tagger("extra")]);
                run(&derived.then(Some(echo_trace())).unwrap()).await
            }));
        }
        for task in tasks {
            let (trace, _) = task.await.unwrap();
            assert_eq!(trace, "base,extra");
        }
        assert_eq!(base.len(), 1);
    }

    #[tokio::test]
    async fn test_first_error_aborts() {
        let built = Arc::new(AtomicUsize::new(0));
        let counting = {
            let built = built.clone();
            constructor(move |next| {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(next)
            })
        };
        let failing = constructor(|_next| {
            Err(BuildError::UnknownMiddleware {
                name: "ghost".to_string(),
            })
        });

        // Constructors run last to first: `counting` (last) runs, `failing` stops it,
        // the outer `counting` never runs.
        let err = Chain::new([counting.clone(), failing, counting])
            .then_fn(|_req| async { Response::new(Body::empty()) })
            .unwrap_err();

        assert!(matches!(err, BuildError::UnknownMiddleware { ref name } if name == "ghost"));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
