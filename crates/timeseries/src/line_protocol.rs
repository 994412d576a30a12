//! Rendering [`factoryops_core::TelemetryPoint`] into InfluxDB line
//! protocol: `measurement,tag=v,tag=v field=v,field=v timestamp`.

use factoryops_core::{MetricNumber, TelemetryPoint};

const MEASUREMENT: &str = "telemetry";

/// Render one point as a single line-protocol line, with no trailing
/// newline.
#[must_use]
pub fn render_point(point: &TelemetryPoint) -> String {
    let mut line = String::with_capacity(128);
    line.push_str(MEASUREMENT);
    line.push(',');
    line.push_str("factory_id=");
    line.push_str(&point.factory_id.get().to_string());
    line.push(',');
    line.push_str("device_id=");
    line.push_str(&point.device_id.get().to_string());
    line.push(' ');

    let mut first = true;
    for (key, value) in point.metrics.iter() {
        if !first {
            line.push(',');
        }
        first = false;
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&render_field(value));
    }

    line.push(' ');
    line.push_str(&point.timestamp.timestamp_nanos_opt().unwrap_or(0).to_string());
    line
}

/// Render a batch of points as newline-separated line protocol, the body
/// format the HTTP write endpoint expects.
#[must_use]
pub fn render_batch(points: &[TelemetryPoint]) -> String {
    points
        .iter()
        .map(render_point)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_field(value: MetricNumber) -> String {
    match value {
        MetricNumber::Int(i) => format!("{i}i"),
        MetricNumber::Float(f) => format!("{f}"),
    }
}

/// Escape the characters line protocol treats specially in tag/field keys:
/// comma, space and equals sign.
fn escape_key(key: &str) -> String {
    key.replace(',', "\\,").replace(' ', "\\ ").replace('=', "\\=")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use factoryops_core::{DeviceId, FactoryId, MetricValue};
    use std::collections::HashMap;

    #[test]
    fn renders_tags_fields_and_timestamp() {
        let mut metrics = HashMap::new();
        metrics.insert("voltage".to_string(), 231.4);
        metrics.insert("current".to_string(), 3.2);
        let point = TelemetryPoint {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(42),
            metrics: MetricValue::from_map(metrics),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            timestamp_clamped: false,
        };
        let line = render_point(&point);
        assert!(line.starts_with("telemetry,factory_id=1,device_id=42 "));
        assert!(line.contains("voltage=231.4"));
        assert!(line.contains("current=3.2"));
        assert!(line.ends_with("1700000000000000000"));
    }

    #[test]
    fn escapes_special_characters_in_keys() {
        assert_eq!(escape_key("a,b"), "a\\,b");
        assert_eq!(escape_key("a b"), "a\\ b");
        assert_eq!(escape_key("a=b"), "a\\=b");
    }

    #[test]
    fn batch_joins_with_newlines() {
        let mut metrics = HashMap::new();
        metrics.insert("temp".to_string(), 10.0);
        let point = TelemetryPoint {
            factory_id: FactoryId::new(1),
            device_id: DeviceId::new(1),
            metrics: MetricValue::from_map(metrics),
            timestamp: Utc::now(),
            timestamp_clamped: false,
        };
        let batch = render_batch(&[point.clone(), point]);
        assert_eq!(batch.lines().count(), 2);
    }
}
