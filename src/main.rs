//! Edge router.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ route table (Host)
//!                                         │
//!                                         ▼
//!                              Connection header sanitizer
//!                                         │
//!                                         ▼
//!                              middlewares (headers, forward auth, chains)
//!                                         │
//!                                         ▼
//!                              forwarder ──▶ CNAME resolver ──▶ Upstream
//!                                         │
//!     Client Response                     ▼
//!     ◀────────────── response modifiers (reverse order)
//!
//!     Background (task pool): config reload, CNAME cache sweep
//! ```
//!
//! # Usage
//!
//! `edge-router [CONFIG]` takes a single positional argument, the TOML
//! configuration path (default `edge-router.toml`). Extra arguments are
//! ignored with a warning.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use edge_router::config::{load_config, ConfigWatcher};
use edge_router::http::{http_client, HttpServer};
use edge_router::lifecycle::{shutdown_signal, Pool};
use edge_router::observability::{logging, metrics};
use edge_router::resolver::HostResolver;
use edge_router::routing::{spawn_reload, RouteTable};

const DEFAULT_CONFIG_PATH: &str = "edge-router.toml";

/// Config path from the first argument, plus any arguments left over.
fn parse_args(mut args: impl Iterator<Item = String>) -> (PathBuf, Vec<String>) {
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    (config_path, args.collect())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config_path, ignored) = parse_args(std::env::args().skip(1));

    // 1. Configuration and logging
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let _ = logging::init("info");
            tracing::error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    logging::init(&config.observability.log_level)?;

    if !ignored.is_empty() {
        tracing::warn!(ignored = ?ignored, "Ignoring extra command line arguments");
    }

    tracing::info!(
        path = %config_path.display(),
        routers = config.routers.len(),
        middlewares = config.middlewares.len(),
        "edge-router v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // 2. Background tasks and routes
    let pool = Pool::new();
    let resolver = Arc::new(HostResolver::new(&config.resolver));
    resolver.spawn_cache_cleanup(&pool);

    let table = Arc::new(RouteTable::new(resolver, http_client()));
    table.apply(&config);

    let (watcher, updates) = ConfigWatcher::new(&config_path);
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    spawn_reload(&pool, table.clone(), updates);

    // 3. Serve
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    HttpServer::new(table).run(listener, shutdown_signal()).await?;

    // 4. Drain background work
    pool.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|a| a.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_default_config_path() {
        let (path, extra) = parse_args(args(&[]));
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(extra.is_empty());
    }

    #[test]
    fn test_extra_arguments_are_reported() {
        let (path, extra) = parse_args(args(&["router.toml", "--verbose", "x"]));
        assert_eq!(path, PathBuf::from("router.toml"));
        assert_eq!(extra, vec!["--verbose".to_string(), "x".to_string()]);
    }
}
