//! Last-seen coalescing: debounces `devices.last_seen` writes per device so
//! a hot device does not generate one relational write per message, per
//! §4.4 step 7 and §5's "one writer in flight" resource rule.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use factoryops_core::{DeviceId, FactoryId};
use factoryops_state::{keys, SharedCache};
use factoryops_store::RelationalStore;

/// Debounce window for coalesced `last_seen` writes, per §13's resolved
/// open question (`FACTORYOPS_LAST_SEEN_DEBOUNCE_MS`, default 5s).
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

struct PendingWrite {
    factory_id: FactoryId,
    latest_timestamp: DateTime<Utc>,
    flush_scheduled: bool,
}

/// Coalesces last-seen updates per device: the first update for a device
/// schedules a flush after the debounce window; updates that arrive before
/// the flush only bump the pending timestamp, never add a second write.
pub struct LastSeenCoalescer<C: ?Sized, S: ?Sized> {
    pending: Arc<DashMap<i64, PendingWrite>>,
    shared: Arc<C>,
    store: Arc<S>,
    debounce: Duration,
}

impl<C, S> LastSeenCoalescer<C, S>
where
    C: SharedCache + ?Sized + 'static,
    S: RelationalStore + ?Sized + 'static,
{
    /// Build a coalescer with the given debounce window.
    #[must_use]
    pub fn new(shared: Arc<C>, store: Arc<S>, debounce: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            shared,
            store,
            debounce,
        }
    }

    /// Record a sighting. Updates the hot-read shared-cache mirror
    /// immediately and schedules (or extends) a debounced relational write.
    pub async fn record(&self, factory_id: FactoryId, device_id: DeviceId, timestamp: DateTime<Utc>) {
        let cache_key = keys::last_seen(device_id.get());
        let _ = self
            .shared
            .set(&cache_key, &timestamp.to_rfc3339(), Some(Duration::from_secs(600)))
            .await;

        let should_spawn = {
            let mut entry = self.pending.entry(device_id.get()).or_insert_with(|| PendingWrite {
                factory_id,
                latest_timestamp: timestamp,
                flush_scheduled: false,
            });
            if timestamp > entry.latest_timestamp {
                entry.latest_timestamp = timestamp;
            }
            if entry.flush_scheduled {
                false
            } else {
                entry.flush_scheduled = true;
                true
            }
        };

        if should_spawn {
            let pending = Arc::clone(&self.pending);
            let store = Arc::clone(&self.store);
            let debounce = self.debounce;
            let device_key = device_id.get();
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let write = pending.remove(&device_key).map(|(_, v)| v);
                if let Some(write) = write {
                    if let Err(e) = store.bump_last_seen(write.factory_id, device_id, write.latest_timestamp).await {
                        tracing::warn!(device_id = device_key, error = %e, "failed to flush coalesced last_seen write");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_state_memory::MemorySharedCache;
    use factoryops_store::InMemoryStore;

    #[tokio::test]
    async fn coalesces_rapid_updates_into_one_write() {
        let store = Arc::new(InMemoryStore::new());
        let shared = Arc::new(MemorySharedCache::new());
        let coalescer = LastSeenCoalescer::new(Arc::clone(&shared), Arc::clone(&store), Duration::from_millis(20));

        let factory_id = FactoryId::new(1);
        let device_id = DeviceId::new(1);
        let t0 = Utc::now();

        coalescer.record(factory_id, device_id, t0).await;
        coalescer
            .record(factory_id, device_id, t0 + chrono::Duration::seconds(1))
            .await;
        coalescer
            .record(factory_id, device_id, t0 + chrono::Duration::seconds(2))
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        let cached = shared.get(&keys::last_seen(device_id.get())).await.unwrap();
        assert!(cached.is_some());
    }
}
