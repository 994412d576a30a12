//! Alert condition configuration.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionTree;
use crate::types::{DeviceId, FactoryId, RuleId};

/// Severity assigned to a rule and carried onto every alert it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth attention soon.
    Medium,
    /// Needs prompt attention.
    High,
    /// Needs immediate attention.
    Critical,
}

/// Whether a rule applies to a fixed set of devices or every device in the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Applies only to `device_ids`.
    Device,
    /// Applies to every device in the factory.
    Global,
}

/// Notification transport a firing rule should enqueue to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Email transport (out of scope; handled by an external notifier).
    Email,
    /// WhatsApp transport (out of scope; handled by an external notifier).
    Whatsapp,
}

/// Which schedule predicate a rule uses to gate firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Always scheduled; the schedule predicate never blocks firing.
    Always,
    /// Gated to a weekly time-of-day window, evaluated in the factory's timezone.
    TimeWindow,
    /// Gated to a calendar date range.
    DateRange,
}

/// Configuration for a rule's schedule predicate. Only the fields relevant
/// to `schedule_type` are consulted; the rest are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScheduleConfig {
    /// Days of week the time window applies on (`time_window` only).
    #[serde(default)]
    pub days: Vec<Weekday>,
    /// Window start time of day, inclusive (`time_window` only).
    pub start_time: Option<NaiveTime>,
    /// Window end time of day, inclusive (`time_window` only). If earlier
    /// than `start_time`, the window wraps past midnight.
    pub end_time: Option<NaiveTime>,
    /// Date range start, inclusive (`date_range` only).
    pub start_date: Option<NaiveDate>,
    /// Date range end, inclusive (`date_range` only).
    pub end_date: Option<NaiveDate>,
}

/// An alert condition attached to a factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable numeric identifier.
    pub id: RuleId,
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Operator-facing name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Device-scoped or factory-global.
    pub scope: RuleScope,
    /// The boolean condition evaluated against each telemetry message.
    pub conditions: ConditionTree,
    /// Minimum minutes between successive alerts from this rule for the
    /// same device, in `[0, 1440]`.
    pub cooldown_minutes: i64,
    /// Whether the rule is currently considered by the alerting worker.
    pub is_active: bool,
    /// Which schedule predicate gates firing.
    pub schedule_type: ScheduleType,
    /// Parameters for the schedule predicate.
    pub schedule_config: ScheduleConfig,
    /// Severity recorded on any alert this rule raises.
    pub severity: Severity,
    /// Notification transports to enqueue to when this rule fires.
    pub notification_channels: Vec<NotificationChannel>,
    /// Devices this rule applies to when `scope = Device`. Must be
    /// non-empty and every id must belong to `factory_id`; empty when
    /// `scope = Global`.
    pub device_ids: Vec<DeviceId>,
}

/// Maximum cooldown accepted by validation, per the data model (24 hours).
pub const MAX_COOLDOWN_MINUTES: i64 = 1440;

/// Reasons a [`Rule`] fails validation before it is accepted into the
/// relational store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleValidationError {
    /// `scope = Device` but `device_ids` is empty.
    #[error("device-scoped rule must reference at least one device")]
    EmptyDeviceScope,
    /// `cooldown_minutes` outside `[0, 1440]`.
    #[error("cooldown_minutes must be in [0, {MAX_COOLDOWN_MINUTES}]")]
    CooldownOutOfRange,
    /// The condition tree nests deeper than allowed, or has an empty group.
    #[error("invalid condition tree: {0}")]
    InvalidConditionTree(#[from] crate::condition::ConditionError),
}

impl Rule {
    /// Validate structural invariants from the data model: non-empty device
    /// scope, cooldown bounds, and condition-tree well-formedness.
    ///
    /// Does not check that referenced `device_ids` actually belong to
    /// `factory_id`; that requires a relational-store lookup and is the
    /// caller's responsibility at the API boundary.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        if self.scope == RuleScope::Device && self.device_ids.is_empty() {
            return Err(RuleValidationError::EmptyDeviceScope);
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&self.cooldown_minutes) {
            return Err(RuleValidationError::CooldownOutOfRange);
        }
        self.conditions
            .evaluate(&crate::telemetry::MetricValue::default())?;
        Ok(())
    }

    /// Whether this rule applies to the given device, per `scope`.
    #[must_use]
    pub fn applies_to(&self, device_id: DeviceId) -> bool {
        match self.scope {
            RuleScope::Global => true,
            RuleScope::Device => self.device_ids.contains(&device_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Comparator;

    fn base_rule() -> Rule {
        Rule {
            id: RuleId::new(1),
            factory_id: FactoryId::new(1),
            name: "test".into(),
            description: None,
            scope: RuleScope::Global,
            conditions: ConditionTree::Leaf {
                parameter: "temp".into(),
                op: Comparator::Gt,
                threshold: 50.0,
            },
            cooldown_minutes: 15,
            is_active: true,
            schedule_type: ScheduleType::Always,
            schedule_config: ScheduleConfig::default(),
            severity: Severity::High,
            notification_channels: vec![NotificationChannel::Email],
            device_ids: vec![],
        }
    }

    #[test]
    fn device_scope_requires_devices() {
        let mut rule = base_rule();
        rule.scope = RuleScope::Device;
        assert_eq!(rule.validate(), Err(RuleValidationError::EmptyDeviceScope));
        rule.device_ids = vec![DeviceId::new(1)];
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn cooldown_bounds_enforced() {
        let mut rule = base_rule();
        rule.cooldown_minutes = -1;
        assert_eq!(rule.validate(), Err(RuleValidationError::CooldownOutOfRange));
        rule.cooldown_minutes = MAX_COOLDOWN_MINUTES + 1;
        assert_eq!(rule.validate(), Err(RuleValidationError::CooldownOutOfRange));
        rule.cooldown_minutes = MAX_COOLDOWN_MINUTES;
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn global_scope_applies_to_any_device() {
        let rule = base_rule();
        assert!(rule.applies_to(DeviceId::new(42)));
    }
}
