//! An in-memory [`RelationalStore`] test double. Mirrors the Postgres
//! store's semantics (unique-key upserts, atomic alert+cooldown commit)
//! without a database, for use in crate and integration tests elsewhere in
//! the workspace.

use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use factoryops_core::{
    Alert, AlertId, DataType, Device, DeviceId, DeviceParameter, Factory, FactoryId, ParameterId,
    Rule, RuleId,
};

use crate::error::StoreError;
use crate::health::ActiveAlertCounts;
use crate::traits::{next_id, NewAlert, NewDevice, RelationalStore};

#[derive(Default)]
struct Inner {
    factories: HashMap<FactoryId, Factory>,
    devices: HashMap<DeviceId, Device>,
    parameters: HashMap<ParameterId, DeviceParameter>,
    rules: HashMap<RuleId, Rule>,
    cooldowns: HashMap<(RuleId, DeviceId), DateTime<Utc>>,
    alerts: HashMap<AlertId, Alert>,
}

/// In-memory stand-in for [`crate::postgres::PostgresStore`].
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    device_ids: AtomicI64,
    parameter_ids: AtomicI64,
    alert_ids: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// An empty store with no factories, devices, rules or alerts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            device_ids: AtomicI64::new(0),
            parameter_ids: AtomicI64::new(0),
            alert_ids: AtomicI64::new(0),
        }
    }

    /// Seed a factory directly, bypassing the trait (factories are not
    /// created through ingestion in this architecture).
    pub fn seed_factory(&self, factory: Factory) {
        self.inner.lock().unwrap().factories.insert(factory.id, factory);
    }

    /// Seed a rule directly, as the rule-management surface is out of scope
    /// for this crate.
    pub fn seed_rule(&self, rule: Rule) {
        self.inner.lock().unwrap().rules.insert(rule.id, rule);
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn get_factory_by_slug(&self, slug: &str) -> Result<Option<Factory>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .factories
            .values()
            .find(|f| f.slug == slug)
            .cloned())
    }

    async fn get_factory(&self, factory_id: FactoryId) -> Result<Option<Factory>, StoreError> {
        Ok(self.inner.lock().unwrap().factories.get(&factory_id).cloned())
    }

    async fn get_device(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .devices
            .get(&device_id)
            .filter(|d| d.factory_id == factory_id)
            .cloned())
    }

    async fn get_device_by_key(
        &self,
        factory_id: FactoryId,
        device_key: &str,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .devices
            .values()
            .find(|d| d.factory_id == factory_id && d.device_key == device_key)
            .cloned())
    }

    async fn list_devices(&self, factory_id: FactoryId) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .devices
            .values()
            .filter(|d| d.factory_id == factory_id)
            .cloned()
            .collect())
    }

    async fn insert_device_if_absent(&self, device: NewDevice) -> Result<Device, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .devices
            .values()
            .find(|d| d.factory_id == device.factory_id && d.device_key == device.device_key)
        {
            return Ok(existing.clone());
        }
        let id = DeviceId::new(next_id(&self.device_ids));
        let created = Device::auto_created(id, device.factory_id, device.device_key);
        inner.devices.insert(id, created.clone());
        Ok(created)
    }

    async fn device_parameter_keys(&self, device_id: DeviceId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .parameters
            .values()
            .filter(|p| p.device_id == device_id)
            .map(|p| p.parameter_key.clone())
            .collect())
    }

    async fn insert_parameter_if_absent(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
        parameter_key: &str,
        data_type: DataType,
        discovered_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let exists = inner
            .parameters
            .values()
            .any(|p| p.device_id == device_id && p.parameter_key == parameter_key);
        if exists {
            return Ok(false);
        }
        let id = ParameterId::new(next_id(&self.parameter_ids));
        let param = DeviceParameter::discovered(
            id,
            factory_id,
            device_id,
            parameter_key.to_string(),
            data_type,
            discovered_at,
        );
        inner.parameters.insert(id, param);
        Ok(true)
    }

    async fn list_parameters(
        &self,
        device_id: DeviceId,
    ) -> Result<Vec<DeviceParameter>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .parameters
            .values()
            .filter(|p| p.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn bump_last_seen(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(device) = inner
            .devices
            .get_mut(&device_id)
            .filter(|d| d.factory_id == factory_id)
        {
            device.last_seen = Some(match device.last_seen {
                Some(existing) if existing > timestamp => existing,
                _ => timestamp,
            });
        }
        Ok(())
    }

    async fn candidate_rules(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Vec<Rule>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rules
            .values()
            .filter(|r| r.factory_id == factory_id && r.is_active && r.applies_to(device_id))
            .cloned()
            .collect())
    }

    async fn cooldown_last_triggered(
        &self,
        rule_id: RuleId,
        device_id: DeviceId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .cooldowns
            .get(&(rule_id, device_id))
            .copied())
    }

    async fn commit_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = AlertId::new(next_id(&self.alert_ids));
        let created = Alert {
            id,
            factory_id: alert.factory_id,
            rule_id: alert.rule_id,
            device_id: alert.device_id,
            triggered_at: alert.triggered_at,
            resolved_at: None,
            severity: alert.severity,
            message: alert.message,
            telemetry_snapshot: alert.telemetry_snapshot,
            notification_sent: false,
        };
        inner.alerts.insert(id, created.clone());
        inner
            .cooldowns
            .insert((alert.rule_id, alert.device_id), alert.triggered_at);
        Ok(created)
    }

    async fn active_alert_counts(
        &self,
        factory_id: FactoryId,
    ) -> Result<ActiveAlertCounts, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut counts = ActiveAlertCounts::default();
        for alert in inner.alerts.values() {
            if alert.factory_id != factory_id || !alert.is_active() {
                continue;
            }
            match alert.severity {
                factoryops_core::Severity::Critical => counts.critical += 1,
                factoryops_core::Severity::High => counts.high += 1,
                factoryops_core::Severity::Medium => counts.medium += 1,
                factoryops_core::Severity::Low => counts.low += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_core::MetricValue;
    use std::str::FromStr;

    fn factory() -> Factory {
        Factory {
            id: FactoryId::new(1),
            slug: "plant-01".into(),
            name: "Plant 01".into(),
            timezone: chrono_tz::Tz::from_str("Asia/Kolkata").unwrap(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn device_insert_is_idempotent_on_key() {
        let store = InMemoryStore::new();
        store.seed_factory(factory());
        let new_device = NewDevice {
            factory_id: FactoryId::new(1),
            device_key: "cnc-01".into(),
        };
        let first = store.insert_device_if_absent(new_device.clone()).await.unwrap();
        let second = store.insert_device_if_absent(new_device).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn commit_alert_sets_cooldown() {
        let store = InMemoryStore::new();
        let triggered_at = Utc::now();
        let alert = NewAlert {
            factory_id: FactoryId::new(1),
            rule_id: RuleId::new(1),
            device_id: DeviceId::new(1),
            triggered_at,
            severity: factoryops_core::Severity::High,
            message: "Rule 'Overheat' triggered".into(),
            telemetry_snapshot: MetricValue::default(),
        };
        store.commit_alert(alert).await.unwrap();
        let last = store
            .cooldown_last_triggered(RuleId::new(1), DeviceId::new(1))
            .await
            .unwrap();
        assert_eq!(last, Some(triggered_at));
    }

    #[tokio::test]
    async fn active_alert_counts_ignore_resolved() {
        let store = InMemoryStore::new();
        let alert = NewAlert {
            factory_id: FactoryId::new(1),
            rule_id: RuleId::new(1),
            device_id: DeviceId::new(1),
            triggered_at: Utc::now(),
            severity: factoryops_core::Severity::Critical,
            message: "x".into(),
            telemetry_snapshot: MetricValue::default(),
        };
        store.commit_alert(alert).await.unwrap();
        let counts = store.active_alert_counts(FactoryId::new(1)).await.unwrap();
        assert_eq!(counts.critical, 1);
    }
}
