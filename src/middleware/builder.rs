//! Named middleware resolution.
//!
//! # Responsibilities
//! - Turn a list of middleware names into a [`Chain`]
//! - Resolve each name against one configuration snapshot
//! - Reject unknown names and self-referencing chains at build time
//!
//! # Design Decisions
//! - Constructors resolve lazily: nothing is validated until `Chain::then`,
//!   and the first failure aborts the whole route
//! - The builder only reads its snapshot; concurrent route builds share it

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::forward_auth;
use crate::config::MiddlewareSpec;
use crate::http::Handler;
use crate::middleware::chain::{constructor, Chain, Constructor};
use crate::middleware::headers::{request_headers, CustomHeaders};
use crate::middleware::BuildError;

/// Builds request-side middleware chains from one snapshot.
#[derive(Debug, Clone)]
pub struct MiddlewareBuilder {
    configs: Arc<BTreeMap<String, MiddlewareSpec>>,
}

impl MiddlewareBuilder {
    pub fn new(configs: Arc<BTreeMap<String, MiddlewareSpec>>) -> Self {
        Self { configs }
    }

    pub fn configs(&self) -> &BTreeMap<String, MiddlewareSpec> {
        &self.configs
    }

    /// Chain for `names`, outermost first.
    pub fn build_chain(&self, names: &[String]) -> Chain {
        self.build_chain_within(names, Vec::new())
    }

    fn build_chain_within(&self, names: &[String], stack: Vec<String>) -> Chain {
        Chain::new(
            names
                .iter()
                .map(|name| self.constructor_for(name.clone(), stack.clone())),
        )
    }

    fn constructor_for(&self, name: String, stack: Vec<String>) -> Constructor {
        let builder = self.clone();
        constructor(move |next| {
            builder
                .build_middleware(&name, &stack, next)
                .map_err(|e| e.in_middleware(&name))
        })
    }

    fn build_middleware(
        &self,
        name: &str,
        stack: &[String],
        next: Handler,
    ) -> Result<Handler, BuildError> {
        if stack.iter().any(|n| n == name) {
            return Err(BuildError::Recursion {
                path: format!("{} -> {}", stack.join(" -> "), name),
            });
        }

        let spec = self
            .configs
            .get(name)
            .ok_or_else(|| BuildError::UnknownMiddleware {
                name: name.to_string(),
            })?;

        tracing::debug!(middleware = %name, kind = spec.kind(), "Creating middleware");

        match spec {
            MiddlewareSpec::Headers(config) => {
                let rules = CustomHeaders::compile(&config.custom_request_headers)?;
                request_headers(rules)(next)
            }
            MiddlewareSpec::Chain(chain) => {
                let mut stack = stack.to_vec();
                stack.push(name.to_string());
                self.build_chain_within(&chain.middlewares, stack)
                    .then(Some(next))
            }
            MiddlewareSpec::ForwardAuth(config) => forward_auth(name, config)?(next),
        }
    }
}
