//! A triggered incident, persisted with the telemetry snapshot that caused it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::Severity;
use crate::telemetry::MetricValue;
use crate::types::{AlertId, DeviceId, FactoryId, RuleId};

/// An alert raised by the rule engine for one `(rule, device)` trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable numeric identifier.
    pub id: AlertId,
    /// Owning factory; must equal both `rule.factory_id` and `device.factory_id`.
    pub factory_id: FactoryId,
    /// The rule that fired.
    pub rule_id: RuleId,
    /// The device the rule fired for.
    pub device_id: DeviceId,
    /// When the rule fired.
    pub triggered_at: DateTime<Utc>,
    /// When an operator resolved the alert, if they have.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Copied from the rule at trigger time.
    pub severity: Severity,
    /// Deterministic human-readable message naming the triggering parameters.
    pub message: String,
    /// The full metrics map that satisfied the rule, for display alongside the alert.
    pub telemetry_snapshot: MetricValue,
    /// Whether a `notifications` task has been enqueued for this alert.
    pub notification_sent: bool,
}

impl Alert {
    /// An alert counts toward factory health scoring iff it has not been resolved.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Render the deterministic alert message template referencing the rule name
/// and the parameters from `conditions` that are present in `metrics`.
#[must_use]
pub fn render_message(rule_name: &str, parameter_keys: &[&str], metrics: &MetricValue) -> String {
    let parts: Vec<String> = parameter_keys
        .iter()
        .filter_map(|key| metrics.get(key).map(|v| format!("{key}={v}")))
        .collect();
    if parts.is_empty() {
        format!("Rule '{rule_name}' triggered")
    } else {
        format!("Rule '{rule_name}' triggered ({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn message_lists_triggering_parameters() {
        let mut map = HashMap::new();
        map.insert("spindle_temp".to_string(), 82.5);
        map.insert("coolant_flow".to_string(), 3.2);
        let metrics = MetricValue::from_map(map);
        let msg = render_message("Overheat", &["spindle_temp", "coolant_flow"], &metrics);
        assert!(msg.contains("spindle_temp=82.5"));
        assert!(msg.contains("coolant_flow=3.2"));
    }
}
