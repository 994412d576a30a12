//! Health/staleness computation (C8): online/offline derivation, per-KPI
//! staleness, and the factory health score, all pure derivations over
//! queried state per §4.8.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use factoryops_core::health::{self, HealthInputs};
use factoryops_core::{Device, FactoryId};
use factoryops_store::RelationalStore;

use crate::error::AlertingError;

/// Default staleness threshold for live-KPI reads, re-exported for callers
/// that do not want to hardcode the core constant's path.
pub const DEFAULT_STALENESS_THRESHOLD: Duration =
    Duration::from_secs(health::DEFAULT_STALENESS_THRESHOLD_SECS as u64);

/// A point-in-time summary of one factory's device and alert health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryHealthSnapshot {
    /// Devices currently reporting within the online threshold.
    pub online_devices: u32,
    /// Devices that have gone quiet past the online threshold.
    pub offline_devices: u32,
    /// The 0-100 composite score per §4.8's formula.
    pub score: u8,
}

/// Computes device online/offline state and factory health scores. Holds
/// no state itself; every call re-queries the store, so the caller owns
/// any short-lived caching of the result.
pub struct HealthComputer<S: ?Sized> {
    store: Arc<S>,
}

impl<S> HealthComputer<S>
where
    S: RelationalStore + ?Sized + 'static,
{
    /// Build a computer over a relational store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Whether a device counts as online at `now`.
    #[must_use]
    pub fn device_is_online(device: &Device, now: DateTime<Utc>) -> bool {
        health::is_online(device.last_seen, now)
    }

    /// Whether a device's live-KPI reading should be flagged stale at `now`,
    /// using `staleness_threshold` (defaults to 60s per §4.8).
    #[must_use]
    pub fn device_is_stale(device: &Device, now: DateTime<Utc>, staleness_threshold: Duration) -> bool {
        health::is_stale(device.last_seen, now, staleness_threshold.as_secs() as i64)
    }

    /// Derive the factory-wide health snapshot: online/offline device
    /// counts plus the subtractive score over active alerts and offline
    /// devices.
    ///
    /// # Errors
    ///
    /// Returns a transient or permanent store error if either query fails.
    pub async fn factory_snapshot(
        &self,
        factory_id: FactoryId,
        now: DateTime<Utc>,
    ) -> Result<FactoryHealthSnapshot, AlertingError> {
        let devices = self.store.list_devices(factory_id).await?;
        let mut online_devices = 0u32;
        let mut offline_devices = 0u32;
        for device in &devices {
            if Self::device_is_online(device, now) {
                online_devices += 1;
            } else {
                offline_devices += 1;
            }
        }

        let counts = self.store.active_alert_counts(factory_id).await?;
        let mut inputs: HealthInputs = counts.into();
        inputs.offline_devices = offline_devices;

        Ok(FactoryHealthSnapshot {
            online_devices,
            offline_devices,
            score: health::health_score(inputs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use factoryops_core::{Device, DeviceId};
    use factoryops_store::{InMemoryStore, NewDevice};

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let online = store
            .insert_device_if_absent(NewDevice {
                factory_id: FactoryId::new(1),
                device_key: "online-dev".into(),
            })
            .await
            .unwrap();
        store
            .bump_last_seen(FactoryId::new(1), online.id, Utc::now())
            .await
            .unwrap();

        let offline = store
            .insert_device_if_absent(NewDevice {
                factory_id: FactoryId::new(1),
                device_key: "offline-dev".into(),
            })
            .await
            .unwrap();
        store
            .bump_last_seen(
                FactoryId::new(1),
                offline.id,
                Utc::now() - ChronoDuration::hours(2),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn snapshot_counts_online_and_offline() {
        let store = seeded_store().await;
        let computer = HealthComputer::new(store);
        let snapshot = computer.factory_snapshot(FactoryId::new(1), Utc::now()).await.unwrap();
        assert_eq!(snapshot.online_devices, 1);
        assert_eq!(snapshot.offline_devices, 1);
        assert_eq!(snapshot.score, 99);
    }

    #[test]
    fn device_never_seen_is_offline_and_stale() {
        let device = Device::auto_created(DeviceId::new(1), FactoryId::new(1), "dev".into());
        let now = Utc::now();
        assert!(!HealthComputer::<InMemoryStore>::device_is_online(&device, now));
        assert!(HealthComputer::<InMemoryStore>::device_is_stale(
            &device,
            now,
            DEFAULT_STALENESS_THRESHOLD
        ));
    }
}
