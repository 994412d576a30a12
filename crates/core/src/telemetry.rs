//! Open-schema telemetry representation: the one place in the core where
//! metric shape is not fixed ahead of time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, FactoryId};

/// A single numeric metric value as it arrives over MQTT: either an integer
/// or a floating-point JSON number. Kept distinct from `f64` at the parse
/// boundary so [`crate::parameter::DataType`] inference can use the original
/// shape; arithmetic and comparison always go through `as_f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricNumber {
    /// An integer-valued JSON number.
    Int(i64),
    /// A JSON number with a fractional component.
    Float(f64),
}

impl MetricNumber {
    /// Widen to `f64` for comparison and storage.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    /// True if this value is finite (not NaN or infinite).
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.as_f64().is_finite()
    }
}

/// A validated set of `{metric_key -> value}` pairs from one telemetry
/// message. Construction guarantees every value is finite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricValue(HashMap<String, MetricNumber>);

impl MetricValue {
    /// Build from an already-validated map of raw numbers (test helper and
    /// internal constructor).
    #[must_use]
    pub fn from_map(map: HashMap<String, f64>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, MetricNumber::Float(v)))
                .collect(),
        )
    }

    /// Build from an already-typed map, as produced by payload parsing.
    #[must_use]
    pub fn from_typed_map(map: HashMap<String, MetricNumber>) -> Self {
        Self(map)
    }

    /// Look up a metric by key, widened to `f64`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).map(|v| v.as_f64())
    }

    /// Look up a metric by key, preserving its original int/float shape.
    #[must_use]
    pub fn get_typed(&self, key: &str) -> Option<MetricNumber> {
        self.0.get(key).copied()
    }

    /// Iterate over all metric keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricNumber)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True if no metrics are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of metric keys present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The set of keys present, for parameter-discovery reconciliation.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A validated telemetry sample bound for the time-series store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Tag: owning factory.
    pub factory_id: FactoryId,
    /// Tag: reporting device.
    pub device_id: DeviceId,
    /// Fields: one numeric value per metric key.
    pub metrics: MetricValue,
    /// Sample timestamp: parsed message time, or ingestion time if absent,
    /// clamped to `now` if more than 5 minutes in the future.
    pub timestamp: DateTime<Utc>,
    /// Set when `timestamp` was clamped because the original value was too
    /// far in the future.
    pub timestamp_clamped: bool,
}

/// Messages more than this far in the future are clamped to `now` and flagged,
/// per the ingestion coordinator's payload handling.
pub const MAX_FUTURE_SKEW_SECS: i64 = 300;

impl TelemetryPoint {
    /// Construct a point, applying the future-skew clamp described in the
    /// time-series writer's design.
    #[must_use]
    pub fn new(
        factory_id: FactoryId,
        device_id: DeviceId,
        metrics: MetricValue,
        message_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let skew = (message_timestamp - now).num_seconds();
        let (timestamp, timestamp_clamped) = if skew > MAX_FUTURE_SKEW_SECS {
            (now, true)
        } else {
            (message_timestamp, false)
        };
        Self {
            factory_id,
            device_id,
            metrics,
            timestamp,
            timestamp_clamped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_timestamp_is_clamped() {
        let now = Utc::now();
        let future = now + chrono::Duration::seconds(MAX_FUTURE_SKEW_SECS + 60);
        let point = TelemetryPoint::new(
            FactoryId::new(1),
            DeviceId::new(1),
            MetricValue::default(),
            future,
            now,
        );
        assert!(point.timestamp_clamped);
        assert_eq!(point.timestamp, now);
    }

    #[test]
    fn near_future_timestamp_is_not_clamped() {
        let now = Utc::now();
        let near = now + chrono::Duration::seconds(30);
        let point = TelemetryPoint::new(
            FactoryId::new(1),
            DeviceId::new(1),
            MetricValue::default(),
            near,
            now,
        );
        assert!(!point.timestamp_clamped);
        assert_eq!(point.timestamp, near);
    }
}
