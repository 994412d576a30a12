//! In-memory [`SharedCache`] implementation backed by `dashmap`, used for
//! local development, tests, and as the single-process fallback when no
//! Redis URL is configured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use factoryops_state::{CacheError, SharedCache};
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// In-memory shared cache. Expiry is checked lazily on read; there is no
/// background sweeper, matching the scale this backend is meant for
/// (single-process development and test runs).
pub struct MemorySharedCache {
    entries: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl Default for MemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySharedCache {
    /// Construct an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    /// Wrap in an `Arc` for sharing across worker tasks.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError> {
        // No subscribers is not an error: invalidation is best-effort.
        let _ = self.channel(channel).send(message.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, CacheError> {
        let rx = self.channel(channel).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(Result::ok);
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_state::testing::run_cache_conformance_tests;

    #[tokio::test]
    async fn conformance() {
        let cache = MemorySharedCache::new();
        run_cache_conformance_tests(&cache).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_set_is_last_write_wins() {
        let cache = Arc::new(MemorySharedCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.set("k", &i.to_string(), None).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(cache.get("k").await.unwrap().is_some());
    }
}
