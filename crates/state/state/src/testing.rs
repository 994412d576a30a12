//! Conformance test suite shared by every [`crate::store::SharedCache`]
//! backend. Each backend's own test module calls
//! [`run_cache_conformance_tests`] against a fresh instance.

use std::time::Duration;

use futures::StreamExt;

use crate::error::CacheError;
use crate::store::SharedCache;

/// Exercise the full `SharedCache` contract: get/set/delete, TTL expiry,
/// and publish/subscribe.
///
/// # Errors
///
/// Returns an error if any conformance check fails.
pub async fn run_cache_conformance_tests(cache: &dyn SharedCache) -> Result<(), CacheError> {
    test_get_missing(cache).await?;
    test_set_and_get(cache).await?;
    test_delete(cache).await?;
    test_ttl_expiry(cache).await?;
    test_publish_subscribe(cache).await?;
    Ok(())
}

async fn test_get_missing(cache: &dyn SharedCache) -> Result<(), CacheError> {
    assert!(cache.get("conformance:missing").await?.is_none());
    Ok(())
}

async fn test_set_and_get(cache: &dyn SharedCache) -> Result<(), CacheError> {
    cache.set("conformance:key", "value", None).await?;
    assert_eq!(
        cache.get("conformance:key").await?,
        Some("value".to_string())
    );
    Ok(())
}

async fn test_delete(cache: &dyn SharedCache) -> Result<(), CacheError> {
    cache.set("conformance:del", "x", None).await?;
    cache.delete("conformance:del").await?;
    assert!(cache.get("conformance:del").await?.is_none());
    // Deleting an absent key is not an error.
    cache.delete("conformance:del").await?;
    Ok(())
}

async fn test_ttl_expiry(cache: &dyn SharedCache) -> Result<(), CacheError> {
    cache
        .set("conformance:ttl", "x", Some(Duration::from_millis(20)))
        .await?;
    assert_eq!(
        cache.get("conformance:ttl").await?,
        Some("x".to_string())
    );
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.get("conformance:ttl").await?.is_none());
    Ok(())
}

async fn test_publish_subscribe(cache: &dyn SharedCache) -> Result<(), CacheError> {
    let mut stream = cache.subscribe("conformance:channel").await?;
    // Give the subscription a moment to register on backends where it is
    // established asynchronously.
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.publish("conformance:channel", "hello").await?;
    let received = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .ok()
        .flatten();
    assert_eq!(received, Some("hello".to_string()));
    Ok(())
}
