//! The relational-store boundary. Every method takes `factory_id` (or a
//! value it was resolved from) as an explicit parameter, per the
//! factory-level isolation design: a reviewer can grep for the parameter
//! rather than trust a runtime check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use factoryops_core::{
    Alert, DataType, Device, DeviceId, DeviceParameter, Factory, FactoryId, MetricValue, Rule,
    RuleId, Severity,
};

use crate::error::StoreError;
use crate::health::ActiveAlertCounts;

/// A newly observed device, as seen by the ingestion coordinator before it
/// has been assigned an id.
#[derive(Debug, Clone)]
pub struct NewDevice {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Device key from the telemetry topic.
    pub device_key: String,
}

/// An alert to persist, paired with the cooldown commit it must land with.
#[derive(Debug, Clone)]
pub struct NewAlert {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// The rule that fired.
    pub rule_id: RuleId,
    /// The device the rule fired for.
    pub device_id: DeviceId,
    /// When the rule fired.
    pub triggered_at: DateTime<Utc>,
    /// Copied from the rule.
    pub severity: Severity,
    /// Deterministic message.
    pub message: String,
    /// The metrics that satisfied the rule.
    pub telemetry_snapshot: MetricValue,
}

/// Relational persistence for the entities in the data model: factories,
/// devices, device parameters, rules, alerts and cooldowns.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Resolve a factory slug to its row. Returns `None` if unknown.
    async fn get_factory_by_slug(&self, slug: &str) -> Result<Option<Factory>, StoreError>;

    /// Fetch a factory by id, used by the alerting worker to resolve the
    /// timezone a rule's schedule predicate evaluates against.
    async fn get_factory(&self, factory_id: FactoryId) -> Result<Option<Factory>, StoreError>;

    /// Fetch a factory-scoped device. Returns `None` if absent, including
    /// when the id exists but belongs to a different factory — this is how
    /// the isolation invariant turns cross-tenant access into "not found".
    async fn get_device(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Option<Device>, StoreError>;

    /// Resolve `(factory_id, device_key)` to a device row.
    async fn get_device_by_key(
        &self,
        factory_id: FactoryId,
        device_key: &str,
    ) -> Result<Option<Device>, StoreError>;

    /// List every device in a factory (used for offline-count health scoring).
    async fn list_devices(&self, factory_id: FactoryId) -> Result<Vec<Device>, StoreError>;

    /// Insert a device if `(factory_id, device_key)` is absent; on a unique
    /// conflict with a concurrent insert, re-read and return the winner.
    async fn insert_device_if_absent(&self, device: NewDevice) -> Result<Device, StoreError>;

    /// The set of parameter keys already discovered for a device.
    async fn device_parameter_keys(
        &self,
        device_id: DeviceId,
    ) -> Result<Vec<String>, StoreError>;

    /// Insert a parameter if `(device_id, parameter_key)` is absent. Returns
    /// `true` if a new row was inserted, `false` if one already existed.
    #[allow(clippy::too_many_arguments)]
    async fn insert_parameter_if_absent(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
        parameter_key: &str,
        data_type: DataType,
        discovered_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Look up a device's discovered parameters (used by dashboard reads,
    /// not the hot path, but kept here since parameter rows are owned here).
    async fn list_parameters(
        &self,
        device_id: DeviceId,
    ) -> Result<Vec<DeviceParameter>, StoreError>;

    /// Best-effort: set `devices.last_seen = max(existing, timestamp)`.
    async fn bump_last_seen(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Candidate rules for a device: `factory_id` matches, `is_active`, and
    /// either `scope = global` or `scope = device` with this device in
    /// `device_ids`.
    async fn candidate_rules(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Vec<Rule>, StoreError>;

    /// The last time a rule fired for a device, if ever.
    async fn cooldown_last_triggered(
        &self,
        rule_id: RuleId,
        device_id: DeviceId,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Atomically insert an alert row and upsert its cooldown's
    /// `last_triggered`. Either both become visible or neither does.
    async fn commit_alert(&self, alert: NewAlert) -> Result<Alert, StoreError>;

    /// Count active (unresolved) alerts in a factory by severity, for
    /// health scoring.
    async fn active_alert_counts(
        &self,
        factory_id: FactoryId,
    ) -> Result<ActiveAlertCounts, StoreError>;
}

/// Next id allocator shared by the in-memory test store; kept separate so
/// Postgres's `BIGSERIAL` columns are the only source of truth in production.
pub(crate) fn next_id(counter: &std::sync::atomic::AtomicI64) -> i64 {
    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
}
