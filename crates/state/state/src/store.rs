use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::CacheError;

/// Sentinel value written for a negative cache entry (unknown slug or
/// unknown device). Distinguishing "miss" from "known absent" lets callers
/// skip a relational lookup on a repeated unknown topic.
pub const NEGATIVE_SENTINEL: &str = "\0negative";

/// Trait for the shared cache tier sitting between the in-process map and
/// the relational store. Implementations must be `Send + Sync` and safe
/// for concurrent access; every mutating call is independently atomic
/// (no multi-key transactions are required by any caller).
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Fetch a value. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value, overwriting any previous one, with an optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove a key. Never errors if the key was already absent.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Publish an invalidation message on `channel` (see
    /// [`crate::keys::INVALIDATION_CHANNEL`]) so other processes' in-process
    /// caches can drop the corresponding key.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError>;

    /// Subscribe to invalidation messages on `channel`. The returned stream
    /// yields indefinitely until dropped.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, CacheError>;
}

/// Convenience extension for the negative-cache pattern used by identity
/// resolution: write the sentinel with a short TTL, and treat a hit as
/// "known absent" rather than "not yet looked up".
#[async_trait]
pub trait NegativeCacheExt: SharedCache {
    /// Mark `key` as known-absent for `ttl` (spec default: ≤30s).
    async fn set_negative(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.set(key, NEGATIVE_SENTINEL, Some(ttl)).await
    }

    /// Classify a cache read into present / negative / miss.
    async fn get_classified(&self, key: &str) -> Result<CacheLookup, CacheError> {
        Ok(match self.get(key).await? {
            Some(v) if v == NEGATIVE_SENTINEL => CacheLookup::KnownAbsent,
            Some(v) => CacheLookup::Present(v),
            None => CacheLookup::Miss,
        })
    }
}

impl<T: SharedCache + ?Sized> NegativeCacheExt for T {}

/// Result of a classified cache lookup distinguishing a real miss from a
/// cached negative result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A value is cached.
    Present(String),
    /// The key is cached as known-absent (negative cache hit).
    KnownAbsent,
    /// Nothing is cached either way.
    Miss,
}
