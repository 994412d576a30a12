//! Parses and validates the telemetry JSON body, step 2 of the coordinator's
//! per-message pipeline: optional RFC 3339 `timestamp`, required non-empty
//! `metrics` object of finite numbers.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use factoryops_core::MetricNumber;
use serde_json::Value;

use crate::error::IngestError;

/// Parse a message timestamp per §4.4 step 2: RFC 3339 with timezone, or
/// UTC assumed if the timezone offset is absent.
fn parse_message_timestamp(s: &str) -> Result<DateTime<Utc>, IngestError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| IngestError::InvalidPayload(format!("bad timestamp: {e}")))
}

/// A validated telemetry message body, not yet bound to a factory/device.
#[derive(Debug, Clone)]
pub struct ParsedPayload {
    /// Parsed message timestamp, if the payload carried one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Validated, finite numeric metrics.
    pub metrics: HashMap<String, MetricNumber>,
}

/// Parse and validate one message body.
///
/// # Errors
///
/// Returns [`IngestError::InvalidPayload`] if the body is not a JSON object,
/// `metrics` is missing/empty/non-numeric, any metric value is non-finite,
/// or `timestamp` (when present) is not a parseable RFC 3339 string.
pub fn parse_payload(bytes: &[u8]) -> Result<ParsedPayload, IngestError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| IngestError::InvalidPayload(format!("not valid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| IngestError::InvalidPayload("payload is not a JSON object".into()))?;

    let timestamp = match object.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(parse_message_timestamp(s)?),
        Some(_) => {
            return Err(IngestError::InvalidPayload("timestamp must be a string".into()));
        }
    };

    let raw_metrics = object
        .get("metrics")
        .and_then(Value::as_object)
        .ok_or_else(|| IngestError::InvalidPayload("metrics must be a JSON object".into()))?;
    if raw_metrics.is_empty() {
        return Err(IngestError::InvalidPayload("metrics must be non-empty".into()));
    }

    let mut metrics = HashMap::with_capacity(raw_metrics.len());
    for (key, value) in raw_metrics {
        let number = match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetricNumber::Int(i)
                } else if let Some(f) = n.as_f64() {
                    MetricNumber::Float(f)
                } else {
                    return Err(IngestError::InvalidPayload(format!(
                        "metric {key} is not representable as i64 or f64"
                    )));
                }
            }
            _ => {
                return Err(IngestError::InvalidPayload(format!(
                    "metric {key} must be a number"
                )));
            }
        };
        if !number.is_finite() {
            return Err(IngestError::InvalidPayload(format!("metric {key} is not finite")));
        }
        metrics.insert(key.clone(), number);
    }

    Ok(ParsedPayload { timestamp, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_valid_payload() {
        let body = br#"{"metrics":{"voltage":231.4,"current":3}}"#;
        let parsed = parse_payload(body).unwrap();
        assert!(parsed.timestamp.is_none());
        assert_eq!(parsed.metrics.len(), 2);
        assert_eq!(parsed.metrics["current"], MetricNumber::Int(3));
    }

    #[test]
    fn parses_timestamp() {
        let body = br#"{"timestamp":"2024-01-01T00:00:00Z","metrics":{"v":1.0}}"#;
        let parsed = parse_payload(body).unwrap();
        assert!(parsed.timestamp.is_some());
    }

    #[test]
    fn parses_timestamp_without_timezone_as_utc() {
        let body = br#"{"timestamp":"2024-01-01T00:00:00","metrics":{"v":1.0}}"#;
        let parsed = parse_payload(body).unwrap();
        assert_eq!(
            parsed.timestamp,
            Some(DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc))
        );
    }

    #[test]
    fn rejects_empty_metrics() {
        let body = br#"{"metrics":{}}"#;
        assert!(matches!(parse_payload(body), Err(IngestError::InvalidPayload(_))));
    }

    #[test]
    fn rejects_missing_metrics() {
        let body = br#"{"timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(parse_payload(body).is_err());
    }

    #[test]
    fn rejects_non_numeric_metric_values() {
        for body in [
            br#"{"metrics":{"v":null}}"#.as_slice(),
            br#"{"metrics":{"v":true}}"#.as_slice(),
            br#"{"metrics":{"v":"hot"}}"#.as_slice(),
        ] {
            assert!(parse_payload(body).is_err());
        }
    }

    #[test]
    fn rejects_non_finite_values_expressible_in_json() {
        // NaN/Infinity are not valid JSON literals; a decimal literal wide
        // enough to overflow f64 is how a non-finite value reaches here.
        let body = format!(r#"{{"metrics":{{"v":{}}}}}"#, "1".repeat(400));
        assert!(matches!(parse_payload(body.as_bytes()), Err(IngestError::InvalidPayload(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_payload(b"not json").is_err());
    }
}
