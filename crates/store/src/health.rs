//! Bridges the store's alert-count query to the pure health-score
//! derivation in `factoryops-core`.

use factoryops_core::health::HealthInputs;

/// Counts of currently-active alerts by severity, as returned by
/// [`crate::RelationalStore::active_alert_counts`]. Low/medium counts are
/// tracked for completeness even though they do not affect the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveAlertCounts {
    /// Active alerts with severity `critical`.
    pub critical: u32,
    /// Active alerts with severity `high`.
    pub high: u32,
    /// Active alerts with severity `medium`.
    pub medium: u32,
    /// Active alerts with severity `low`.
    pub low: u32,
}

impl From<ActiveAlertCounts> for HealthInputs {
    fn from(counts: ActiveAlertCounts) -> Self {
        HealthInputs {
            critical_alerts: counts.critical,
            high_alerts: counts.high,
            offline_devices: 0,
        }
    }
}
