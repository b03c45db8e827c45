//! Response modification.
//!
//! # Responsibilities
//! - Build, once per route, the function applied to upstream responses
//! - Resolve `headers` middlewares into header rewrites and `chain`
//!   middlewares into nested modifiers
//!
//! # Design Decisions
//! - Modifiers are collected in declaration order and run in reverse, the
//!   unwind order of the request chain: the outermost middleware's effect is
//!   applied last, closest to the wire
//! - The first failing modifier stops the rest; the caller turns the error into
//!   a server error instead of sending a half-modified response
//! - Names without a response side (unknown, `forward_auth`) contribute nothing

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use thiserror::Error;

use crate::config::{HeadersConfig, MiddlewareSpec};
use crate::middleware::headers::CustomHeaders;
use crate::middleware::BuildError;
use crate::security::secure_headers::SecureHeaders;

/// A response modifier failed; the response must not reach the client.
#[derive(Debug, Error)]
#[error("response modifier failed: {0}")]
pub struct ModifierError(pub String);

type ModifierFn = dyn Fn(&mut Response<Body>) -> Result<(), ModifierError> + Send + Sync;

/// A shareable function applied to upstream responses.
#[derive(Clone)]
pub struct ResponseModifier {
    inner: Arc<ModifierFn>,
}

impl ResponseModifier {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Response<Body>) -> Result<(), ModifierError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// A modifier that leaves the response untouched.
    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }

    pub fn apply(&self, response: &mut Response<Body>) -> Result<(), ModifierError> {
        (self.inner)(response)
    }
}

impl fmt::Debug for ResponseModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseModifier").finish_non_exhaustive()
    }
}

/// Run `modifiers` last to first, stopping at the first error.
pub fn compose(mut modifiers: Vec<ResponseModifier>) -> ResponseModifier {
    match modifiers.len() {
        0 => ResponseModifier::noop(),
        1 => modifiers.remove(0),
        _ => ResponseModifier::new(move |response| {
            for modifier in modifiers.iter().rev() {
                modifier.apply(response)?;
            }
            Ok(())
        }),
    }
}

/// Builds response modifiers from one configuration snapshot.
pub struct ResponseModifierBuilder<'a> {
    configs: &'a BTreeMap<String, MiddlewareSpec>,
}

impl<'a> ResponseModifierBuilder<'a> {
    pub fn new(configs: &'a BTreeMap<String, MiddlewareSpec>) -> Self {
        Self { configs }
    }

    /// Build the modifier for a route's middleware names.
    ///
    /// Never returns an absent modifier: with nothing to do it is a no-op.
    /// A chain that (transitively) contains itself is rejected.
    pub fn build(&self, names: &[String]) -> Result<ResponseModifier, BuildError> {
        let mut stack = Vec::new();
        self.build_nested(names, &mut stack)
    }

    fn build_nested(
        &self,
        names: &[String],
        stack: &mut Vec<String>,
    ) -> Result<ResponseModifier, BuildError> {
        let mut modifiers = Vec::new();

        for name in names {
            let Some(spec) = self.configs.get(name) else {
                continue;
            };

            if stack.contains(name) {
                return Err(BuildError::Recursion {
                    path: format!("{} -> {}", stack.join(" -> "), name),
                });
            }

            match spec {
                MiddlewareSpec::Headers(config) => {
                    if let Some(modifier) =
                        headers_modifier(config).map_err(|e| e.in_middleware(name))?
                    {
                        modifiers.push(modifier);
                    }
                }
                MiddlewareSpec::Chain(chain) => {
                    stack.push(name.clone());
                    let nested = self.build_nested(&chain.middlewares, stack);
                    stack.pop();
                    modifiers.push(nested?);
                }
                MiddlewareSpec::ForwardAuth(_) => {}
            }
        }

        Ok(compose(modifiers))
    }
}

fn headers_modifier(config: &HeadersConfig) -> Result<Option<ResponseModifier>, BuildError> {
    let custom = CustomHeaders::compile(&config.custom_response_headers)?;
    let secure = if config.has_security_headers_defined() {
        SecureHeaders::from_config(config)?
    } else {
        SecureHeaders::default()
    };

    if custom.is_empty() && secure.is_empty() {
        return Ok(None);
    }

    Ok(Some(ResponseModifier::new(move |response| {
        custom.apply(response.headers_mut());
        secure.apply(response.headers_mut());
        Ok(())
    })))
}
