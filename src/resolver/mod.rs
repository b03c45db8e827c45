//! CNAME flattening.
//!
//! # Responsibilities
//! - Follow the CNAME chain of a host to its final canonical name
//! - Cache resolved chains with a TTL and sweep expired entries in the background
//!
//! # Design Decisions
//! - Resolution never fails: any lookup problem degrades to `(host, host)`
//! - Chain length and failed queries have separate budgets, both `max_depth`,
//!   so an unreachable nameserver costs at most `max_depth` queries
//! - Nameservers are re-read from the resolver configuration on every miss
//! - Concurrent misses for the same host may both query; the last write wins

pub mod cache;
pub mod lookup;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResolverConfig;
use crate::lifecycle::Pool;
use crate::observability::metrics;

pub use cache::ChainCache;
pub use lookup::{CnameLookup, LookupError, StubLookup};

type LoadFn<L> = dyn Fn() -> L + Send + Sync;

/// Resolves hosts to the end of their CNAME chain.
pub struct HostResolver<L = StubLookup> {
    enabled: bool,
    max_depth: usize,
    cache: Arc<ChainCache>,
    load: Arc<LoadFn<L>>,
}

impl HostResolver<StubLookup> {
    /// Resolver querying the nameservers of `config.resolv_conf`.
    pub fn new(config: &ResolverConfig) -> Self {
        let path = PathBuf::from(&config.resolv_conf);
        Self::with_lookup(config, move || StubLookup::from_resolv_conf(&path))
    }
}

impl<L: CnameLookup> HostResolver<L> {
    /// Resolver using `load` to obtain a lookup for each cache miss.
    pub fn with_lookup<F>(config: &ResolverConfig, load: F) -> Self
    where
        F: Fn() -> L + Send + Sync + 'static,
    {
        Self {
            enabled: config.enabled,
            max_depth: config.max_depth,
            cache: Arc::new(ChainCache::new(Duration::from_secs(config.cache_ttl_secs))),
            load: Arc::new(load),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cache(&self) -> &Arc<ChainCache> {
        &self.cache
    }

    /// Start the periodic cache sweep on `pool`. No-op when disabled.
    pub fn spawn_cache_cleanup(&self, pool: &Pool) {
        if self.enabled {
            self.cache.spawn_cleanup(pool);
        }
    }

    /// Returns `(original, final)`; equal when there is nothing to flatten.
    pub async fn resolve(&self, host: &str) -> (String, String) {
        if !self.enabled {
            return (host.to_string(), host.to_string());
        }

        if let Some(chain) = self.cache.get(host) {
            metrics::record_resolver_cache(true);
            return endpoints(host, &chain);
        }
        metrics::record_resolver_cache(false);

        let lookup = (self.load)();
        let chain = self.flatten(&lookup, host).await;
        let joined = chain.join(",");
        self.cache.insert(host, joined.clone());

        endpoints(host, &joined)
    }

    async fn flatten(&self, lookup: &L, host: &str) -> Vec<String> {
        let mut chain = vec![host.to_string()];
        let mut hops = 0;
        let mut failures = 0;

        while hops < self.max_depth {
            let current = chain[chain.len() - 1].clone();
            match lookup.cname(&current).await {
                Ok(Some(target)) => {
                    if chain.contains(&target) {
                        tracing::warn!(host = %host, target = %target, "CNAME loop detected");
                        break;
                    }
                    tracing::debug!(from = %current, to = %target, "Following CNAME");
                    chain.push(target);
                    hops += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    failures += 1;
                    if failures >= self.max_depth {
                        tracing::warn!(
                            host = %host,
                            error = %e,
                            attempts = failures,
                            "CNAME lookup failed, giving up"
                        );
                        break;
                    }
                    tracing::debug!(host = %current, error = %e, "CNAME lookup failed, retrying");
                }
            }
        }

        chain
    }
}

fn endpoints(host: &str, chain: &str) -> (String, String) {
    let mut parts = chain.split(',');
    let first = parts.next().unwrap_or(host).to_string();
    let last = parts.last().map(str::to_string).unwrap_or_else(|| first.clone());
    (first, last)
}
