//! Identity cache (C1): `slug -> factory_id`, `(factory_id, device_key) ->
//! device_id`, and the per-device discovered-parameter key set, each backed
//! by an in-process TTL tier in front of the shared cache in front of the
//! relational store. Concurrent misses for the same key coalesce through a
//! per-key lock so only one backend call populates the cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use factoryops_core::{DeviceId, FactoryId};
use factoryops_state::{keys, CacheLookup, NegativeCacheExt, SharedCache};
use factoryops_store::{NewDevice, RelationalStore};
use moka::future::Cache;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::IngestError;

/// TTL for the in-process and shared-cache `factory_id`/`device_id` tiers.
const IDENTITY_TTL: Duration = Duration::from_secs(3600);
/// TTL for the in-process and shared-cache discovered-parameter-key tier.
const PARAMS_TTL: Duration = Duration::from_secs(600);
/// How long an unknown slug or device key is held in the negative cache.
const NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// Resolves factory slugs and device keys to stable ids, and tracks each
/// device's discovered parameter key set, per §4.1.
pub struct IdentityCache<C: ?Sized, S: ?Sized> {
    local_factories: Cache<String, FactoryId>,
    local_devices: Cache<(i64, String), DeviceId>,
    local_params: Cache<i64, HashSet<String>>,
    shared: Arc<C>,
    store: Arc<S>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<C, S> IdentityCache<C, S>
where
    C: SharedCache + ?Sized + 'static,
    S: RelationalStore + ?Sized + 'static,
{
    /// Build an identity cache over a shared-cache backend and a relational
    /// store.
    #[must_use]
    pub fn new(shared: Arc<C>, store: Arc<S>) -> Self {
        Self {
            local_factories: Cache::builder().time_to_live(IDENTITY_TTL).build(),
            local_devices: Cache::builder().time_to_live(IDENTITY_TTL).build(),
            local_params: Cache::builder().time_to_live(PARAMS_TTL).build(),
            shared,
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .value(),
        )
    }

    /// Resolve a factory slug, coalescing concurrent misses.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnknownFactory`] if the slug has no row
    /// (including a cached negative result), or a transient error if a
    /// backend call failed.
    pub async fn resolve_factory(&self, slug: &str) -> Result<FactoryId, IngestError> {
        if let Some(id) = self.local_factories.get(slug).await {
            return Ok(id);
        }

        let lock_key = format!("factory:{slug}");
        let lock = self.lock_for(&lock_key);
        let _guard = lock.lock().await;

        // Double-check: another waiter may have just populated this.
        if let Some(id) = self.local_factories.get(slug).await {
            return Ok(id);
        }

        let cache_key = keys::factory_slug(slug);
        match self.shared.get_classified(&cache_key).await? {
            CacheLookup::KnownAbsent => {
                return Err(IngestError::UnknownFactory(slug.to_string()));
            }
            CacheLookup::Present(raw) => {
                if let Ok(id) = raw.parse::<i64>() {
                    let id = FactoryId::new(id);
                    self.local_factories.insert(slug.to_string(), id).await;
                    return Ok(id);
                }
            }
            CacheLookup::Miss => {}
        }

        match self.store.get_factory_by_slug(slug).await? {
            Some(factory) => {
                self.shared
                    .set(&cache_key, &factory.id.get().to_string(), Some(IDENTITY_TTL))
                    .await?;
                self.local_factories.insert(slug.to_string(), factory.id).await;
                Ok(factory.id)
            }
            None => {
                self.shared.set_negative(&cache_key, NEGATIVE_TTL).await?;
                Err(IngestError::UnknownFactory(slug.to_string()))
            }
        }
    }

    /// Resolve `(factory_id, device_key)` to a device id, auto-creating the
    /// device on first sighting per §4.4 step 4.
    ///
    /// # Errors
    ///
    /// Returns a transient or permanent store error if resolution or
    /// creation fails.
    pub async fn resolve_or_create_device(
        &self,
        factory_id: FactoryId,
        device_key: &str,
    ) -> Result<DeviceId, IngestError> {
        let local_key = (factory_id.get(), device_key.to_string());
        if let Some(id) = self.local_devices.get(&local_key).await {
            return Ok(id);
        }

        let lock_key = format!("device:{}:{device_key}", factory_id.get());
        let lock = self.lock_for(&lock_key);
        let _guard = lock.lock().await;

        if let Some(id) = self.local_devices.get(&local_key).await {
            return Ok(id);
        }

        let cache_key = keys::device_key(factory_id.get(), device_key);
        if let CacheLookup::Present(raw) = self.shared.get_classified(&cache_key).await? {
            if let Ok(id) = raw.parse::<i64>() {
                let id = DeviceId::new(id);
                self.local_devices.insert(local_key, id).await;
                return Ok(id);
            }
        }

        let device = match self.store.get_device_by_key(factory_id, device_key).await? {
            Some(device) => device,
            None => {
                self.store
                    .insert_device_if_absent(NewDevice {
                        factory_id,
                        device_key: device_key.to_string(),
                    })
                    .await?
            }
        };

        self.shared
            .set(&cache_key, &device.id.get().to_string(), Some(IDENTITY_TTL))
            .await?;
        self.local_devices.insert(local_key, device.id).await;
        Ok(device.id)
    }

    /// The cached parameter key set for a device, if known locally or in
    /// the shared cache. Returns `None` on a cold cache so the caller falls
    /// back to the relational store (parameter discovery owns that read).
    ///
    /// # Errors
    ///
    /// Returns a transient error if the shared cache call failed.
    pub async fn cached_parameter_keys(
        &self,
        device_id: DeviceId,
    ) -> Result<Option<HashSet<String>>, IngestError> {
        if let Some(keys) = self.local_params.get(&device_id.get()).await {
            return Ok(Some(keys));
        }
        let cache_key = keys::device_params(device_id.get());
        if let Some(raw) = self.shared.get(&cache_key).await? {
            let parsed: HashSet<String> = raw.split(',').filter(|s| !s.is_empty()).map(String::from).collect();
            self.local_params.insert(device_id.get(), parsed.clone()).await;
            return Ok(Some(parsed));
        }
        Ok(None)
    }

    /// Record the full discovered-parameter key set for a device after
    /// reconciling with the relational store.
    ///
    /// # Errors
    ///
    /// Returns a transient error if the shared-cache write failed.
    pub async fn put_parameter_keys(
        &self,
        device_id: DeviceId,
        keys_set: HashSet<String>,
    ) -> Result<(), IngestError> {
        let cache_key = keys::device_params(device_id.get());
        let serialized = keys_set.iter().cloned().collect::<Vec<_>>().join(",");
        self.shared.set(&cache_key, &serialized, Some(PARAMS_TTL)).await?;
        self.local_params.insert(device_id.get(), keys_set).await;
        Ok(())
    }

    /// Drop every cached entry for a factory slug, mirroring the API
    /// layer's CRUD invalidation contract from §6.
    pub async fn invalidate_factory(&self, slug: &str) {
        self.local_factories.invalidate(slug).await;
        let _ = self.shared.delete(&keys::factory_slug(slug)).await;
        let _ = self
            .shared
            .publish(keys::INVALIDATION_CHANNEL, &keys::factory_slug(slug))
            .await;
    }

    /// Drop the cached device id for `(factory_id, device_key)`.
    pub async fn invalidate_device(&self, factory_id: FactoryId, device_key: &str) {
        self.local_devices
            .invalidate(&(factory_id.get(), device_key.to_string()))
            .await;
        let cache_key = keys::device_key(factory_id.get(), device_key);
        let _ = self.shared.delete(&cache_key).await;
        let _ = self.shared.publish(keys::INVALIDATION_CHANNEL, &cache_key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_core::Factory;
    use factoryops_state_memory::MemorySharedCache;
    use factoryops_store::InMemoryStore;
    use std::str::FromStr;
    use std::sync::Arc;

    fn seeded_factory(store: &InMemoryStore, slug: &str) -> Factory {
        let factory = Factory {
            id: FactoryId::new(1),
            slug: slug.to_string(),
            name: "Test Factory".into(),
            timezone: chrono_tz::Tz::from_str("UTC").unwrap(),
            is_active: true,
        };
        store.seed_factory(factory.clone());
        factory
    }

    fn cache_over(store: InMemoryStore) -> IdentityCache<MemorySharedCache, InMemoryStore> {
        IdentityCache::new(Arc::new(MemorySharedCache::new()), Arc::new(store))
    }

    #[tokio::test]
    async fn resolves_known_factory() {
        let store = InMemoryStore::new();
        let factory = seeded_factory(&store, "vpc");
        let cache = cache_over(store);
        let id = cache.resolve_factory("vpc").await.unwrap();
        assert_eq!(id, factory.id);
    }

    #[tokio::test]
    async fn unknown_factory_is_negative_cached() {
        let store = InMemoryStore::new();
        let cache = cache_over(store);
        assert!(matches!(
            cache.resolve_factory("ghost").await,
            Err(IngestError::UnknownFactory(_))
        ));
        // Second lookup should hit the negative cache, not the store again.
        assert!(matches!(
            cache.resolve_factory("ghost").await,
            Err(IngestError::UnknownFactory(_))
        ));
    }

    #[tokio::test]
    async fn device_is_auto_created_on_first_sighting() {
        let store = InMemoryStore::new();
        let factory = seeded_factory(&store, "vpc");
        let cache = cache_over(store);
        let id_a = cache.resolve_or_create_device(factory.id, "M01").await.unwrap();
        let id_b = cache.resolve_or_create_device(factory.id, "M01").await.unwrap();
        assert_eq!(id_a, id_b);
    }

    #[tokio::test]
    async fn concurrent_device_resolution_converges_on_one_id() {
        let store = InMemoryStore::new();
        let factory = seeded_factory(&store, "vpc");
        let cache = Arc::new(cache_over(store));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let factory_id = factory.id;
            handles.push(tokio::spawn(async move {
                cache.resolve_or_create_device(factory_id, "M01").await.unwrap()
            }));
        }
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 1);
    }
}
