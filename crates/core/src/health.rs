//! Pure derivations of device online/offline state, KPI staleness, and
//! factory-level health score. Nothing here is stored state; callers may
//! cache results briefly.

use chrono::{DateTime, Utc};

use crate::rule::Severity;

/// A device counts as online iff it has reported within this many seconds.
pub const ONLINE_THRESHOLD_SECS: i64 = 600;

/// Default staleness threshold for live-KPI reads, distinct from the online
/// threshold.
pub const DEFAULT_STALENESS_THRESHOLD_SECS: i64 = 60;

/// Whether a device with the given `last_seen` is online at `now`.
#[must_use]
pub fn is_online(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_seen {
        Some(ts) => (now - ts).num_seconds() <= ONLINE_THRESHOLD_SECS,
        None => false,
    }
}

/// Whether a live KPI value sourced from `last_seen` should be flagged stale.
#[must_use]
pub fn is_stale(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>, staleness_threshold_secs: i64) -> bool {
    match last_seen {
        Some(ts) => (now - ts).num_seconds() > staleness_threshold_secs,
        None => true,
    }
}

/// Summary input to the factory health score: counts of active alerts by
/// severity plus the number of currently offline devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthInputs {
    /// Active alerts with severity `critical`.
    pub critical_alerts: u32,
    /// Active alerts with severity `high`.
    pub high_alerts: u32,
    /// Devices currently offline.
    pub offline_devices: u32,
}

impl HealthInputs {
    /// Bump the relevant counter for one active alert's severity. `Low` and
    /// `Medium` alerts do not affect the score.
    pub fn record_alert(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical_alerts += 1,
            Severity::High => self.high_alerts += 1,
            Severity::Low | Severity::Medium => {}
        }
    }
}

/// Factory health score: starts at 100, loses 5 per active critical alert,
/// 2 per active high alert, 1 per offline device, clamped to `[0, 100]`.
#[must_use]
pub fn health_score(inputs: HealthInputs) -> u8 {
    let penalty = inputs.critical_alerts as i64 * 5
        + inputs.high_alerts as i64 * 2
        + inputs.offline_devices as i64;
    (100 - penalty).clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_clamps_at_zero() {
        let inputs = HealthInputs {
            critical_alerts: 100,
            high_alerts: 0,
            offline_devices: 0,
        };
        assert_eq!(health_score(inputs), 0);
    }

    #[test]
    fn score_subtracts_weighted_penalties() {
        let inputs = HealthInputs {
            critical_alerts: 2,
            high_alerts: 3,
            offline_devices: 4,
        };
        // 100 - (2*5 + 3*2 + 4*1) = 100 - 20 = 80
        assert_eq!(health_score(inputs), 80);
    }

    #[test]
    fn device_with_no_last_seen_is_offline_and_stale() {
        let now = Utc::now();
        assert!(!is_online(None, now));
        assert!(is_stale(None, now, DEFAULT_STALENESS_THRESHOLD_SECS));
    }
}
