//! Resolved CNAME chain cache.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{self, Instant};

use crate::lifecycle::Pool;

#[derive(Debug, Clone)]
struct Entry {
    chain: String,
    expires_at: Instant,
}

/// Thread-safe TTL cache of comma-joined CNAME chains keyed by original host.
///
/// Expired entries read as misses; a background sweep every 3×TTL drops them.
#[derive(Debug)]
pub struct ChainCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl ChainCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Chain for `host` if present and not expired.
    pub fn get(&self, host: &str) -> Option<String> {
        let entry = self.entries.get(host)?;
        if entry.expires_at > Instant::now() {
            Some(entry.chain.clone())
        } else {
            None
        }
    }

    /// Store a freshly resolved chain, replacing any previous one.
    pub fn insert(&self, host: &str, chain: String) {
        self.entries.insert(
            host.to_string(),
            Entry {
                chain,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.ttl * 3
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the periodic sweep as a pooled task.
    pub fn spawn_cleanup(self: &Arc<Self>, pool: &Pool) {
        let cache = self.clone();
        pool.go(move |stop| async move {
            let period = cache.cleanup_interval();
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Purged expired CNAME cache entries");
                        }
                    }
                    _ = stop.stopped() => {
                        tracing::debug!("CNAME cache cleanup stopping");
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ChainCache::new(Duration::from_secs(30));
        cache.insert("a.example", "a.example,b.example".into());
        assert_eq!(cache.get("a.example").as_deref(), Some("a.example,b.example"));

        time::advance(Duration::from_secs(31)).await;
        assert!(cache.get("a.example").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_replaces_chain() {
        let cache = ChainCache::new(Duration::from_secs(10));
        cache.insert("a.example", "a.example,old.example".into());
        time::advance(Duration::from_secs(11)).await;
        cache.insert("a.example", "a.example,new.example".into());
        assert_eq!(cache.get("a.example").as_deref(), Some("a.example,new.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup() {
        let pool = Pool::new();
        let cache = Arc::new(ChainCache::new(Duration::from_secs(1)));
        assert_eq!(cache.cleanup_interval(), Duration::from_secs(3));
        cache.spawn_cleanup(&pool);

        cache.insert("a.example", "a.example".into());
        time::sleep(Duration::from_millis(3100)).await;
        assert!(cache.is_empty());

        pool.stop().await;
    }
}
