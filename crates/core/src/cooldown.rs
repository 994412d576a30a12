//! Per-`(rule, device)` suppression state; doubles as the commit barrier
//! for alert creation (see the alerting worker's design notes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, RuleId};

/// The last time a rule fired for a device. At most one row exists per
/// `(rule_id, device_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCooldown {
    /// The rule this cooldown gates.
    pub rule_id: RuleId,
    /// The device this cooldown gates.
    pub device_id: DeviceId,
    /// When the rule last fired for this device.
    pub last_triggered: DateTime<Utc>,
}

impl RuleCooldown {
    /// Whether a rule with the given cooldown may fire again at `now`,
    /// given the last time it fired (`None` if it has never fired).
    #[must_use]
    pub fn is_elapsed(last_triggered: Option<DateTime<Utc>>, cooldown_minutes: i64, now: DateTime<Utc>) -> bool {
        match last_triggered {
            None => true,
            Some(last) => (now - last).num_seconds() >= cooldown_minutes * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn elapsed_respects_cooldown_window() {
        let t0 = Utc::now();
        assert!(RuleCooldown::is_elapsed(None, 15, t0));
        assert!(!RuleCooldown::is_elapsed(Some(t0), 15, t0 + Duration::minutes(5)));
        assert!(RuleCooldown::is_elapsed(Some(t0), 15, t0 + Duration::minutes(16)));
        assert!(RuleCooldown::is_elapsed(Some(t0), 15, t0 + Duration::minutes(15)));
    }
}
