//! Live route table.
//!
//! # Responsibilities
//! - Build one handler per router from a configuration snapshot
//! - Publish the whole table atomically, so requests see either the old
//!   or the new set of routes, never a mix
//! - Look up the handler for an inbound `Host`
//!
//! # Design Decisions
//! - A router that fails to build keeps its previous handler; a new router
//!   that fails is left out. Other routers are unaffected either way
//! - Hosts match exactly (case-insensitive, port ignored); a router without a
//!   host is the catch-all. On duplicates the first router by name wins

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::config::{Configuration, RouterConfig};
use crate::http::{Forwarder, Handler, HttpClient, ResponseModifierBuilder};
use crate::lifecycle::Pool;
use crate::middleware::{BuildError, Chain, MiddlewareBuilder};
use crate::observability::metrics;
use crate::resolver::HostResolver;
use crate::security::connection_headers;

#[derive(Debug, Default)]
struct RouteSet {
    handlers: HashMap<String, Handler>,
    by_host: HashMap<String, String>,
    catch_all: Option<String>,
}

impl RouteSet {
    fn insert(&mut self, name: &str, router: &RouterConfig, handler: Handler) {
        match router.host.as_deref() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                if let Some(existing) = self.by_host.get(&host) {
                    tracing::warn!(router = %name, host = %host, existing = %existing, "Duplicate host, router ignored");
                    return;
                }
                self.by_host.insert(host, name.to_string());
            }
            None => {
                if let Some(existing) = &self.catch_all {
                    tracing::warn!(router = %name, existing = %existing, "Duplicate catch-all router ignored");
                    return;
                }
                self.catch_all = Some(name.to_string());
            }
        }
        self.handlers.insert(name.to_string(), handler);
    }

    fn lookup(&self, host: &str) -> Option<&Handler> {
        let name = self.by_host.get(host).or(self.catch_all.as_ref())?;
        self.handlers.get(name)
    }
}

/// Routers compiled into handlers, swappable at runtime.
pub struct RouteTable {
    routes: ArcSwap<RouteSet>,
    resolver: Arc<HostResolver>,
    client: HttpClient,
}

impl RouteTable {
    pub fn new(resolver: Arc<HostResolver>, client: HttpClient) -> Self {
        Self {
            routes: ArcSwap::from_pointee(RouteSet::default()),
            resolver,
            client,
        }
    }

    /// Rebuild every route from `config` and publish the result.
    ///
    /// Returns the number of routes now being served.
    pub fn apply(&self, config: &Configuration) -> usize {
        let previous = self.routes.load();
        let middlewares = MiddlewareBuilder::new(Arc::new(config.middlewares.clone()));
        let modifiers = ResponseModifierBuilder::new(&config.middlewares);
        let mut next = RouteSet::default();

        for (name, router) in &config.routers {
            let handler = match self.build_route(name, router, config, &middlewares, &modifiers) {
                Ok(handler) => {
                    metrics::record_route_build("ok");
                    handler
                }
                Err(e) => match previous.handlers.get(name) {
                    Some(handler) => {
                        tracing::error!(router = %name, error = %e, "Failed to build route, keeping previous handler");
                        metrics::record_route_build("kept_previous");
                        handler.clone()
                    }
                    None => {
                        tracing::error!(router = %name, error = %e, "Failed to build route, route disabled");
                        metrics::record_route_build("dropped");
                        continue;
                    }
                },
            };
            next.insert(name, router, handler);
        }

        let count = next.handlers.len();
        self.routes.store(Arc::new(next));
        tracing::info!(routes = count, "Route table published");
        count
    }

    fn build_route(
        &self,
        name: &str,
        router: &RouterConfig,
        config: &Configuration,
        middlewares: &MiddlewareBuilder,
        modifiers: &ResponseModifierBuilder<'_>,
    ) -> Result<Handler, BuildError> {
        let service = config
            .services
            .get(&router.service)
            .ok_or_else(|| BuildError::UnknownService {
                service: router.service.clone(),
            })?;

        let modifier = modifiers.build(&router.middlewares)?;
        let forwarder = Forwarder::new(
            name,
            service,
            modifier,
            self.resolver.clone(),
            self.client.clone(),
        )?;

        Chain::new([connection_headers()])
            .extend(&middlewares.build_chain(&router.middlewares))
            .then(Some(forwarder.into_handler()))
    }

    /// Handler for an inbound `Host` value, falling back to the catch-all.
    pub fn handler_for(&self, host: &str) -> Option<Handler> {
        let host = strip_port(host).to_ascii_lowercase();
        self.routes.load().lookup(&host).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.load().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [v6]:port
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Apply every snapshot received from the config watcher until the pool stops.
pub fn spawn_reload(
    pool: &Pool,
    table: Arc<RouteTable>,
    mut updates: mpsc::UnboundedReceiver<Configuration>,
) {
    pool.go(move |stop| async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => {
                        let routes = table.apply(&config);
                        tracing::info!(routes, "Configuration reloaded");
                    }
                    None => break,
                },
                _ = stop.stopped() => break,
            }
        }
        tracing::debug!("Reload task stopped");
    });
}
