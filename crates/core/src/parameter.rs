//! One metric channel on one device, discovered from telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, FactoryId, ParameterId};

/// The inferred shape of a parameter's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Values observed so far have all been integer-valued JSON numbers.
    Int,
    /// At least one observed value had a fractional component.
    Float,
    /// Reserved for future non-numeric parameters; never produced by discovery.
    String,
}

/// A metric channel on a device, created the first time its key appears in a
/// telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceParameter {
    /// Stable numeric identifier.
    pub id: ParameterId,
    /// Owning factory (denormalized from the device for isolation checks).
    pub factory_id: FactoryId,
    /// Owning device.
    pub device_id: DeviceId,
    /// Metric key as it appears in telemetry payloads (≤100 chars).
    pub parameter_key: String,
    /// Display name, defaulting to a title-cased form of `parameter_key`.
    pub display_name: String,
    /// Engineering unit, if known. Never set by auto-discovery.
    pub unit: Option<String>,
    /// Inferred value shape.
    pub data_type: DataType,
    /// Whether this parameter appears on KPI dashboards. Defaults to `true`
    /// on auto-discovery.
    pub is_kpi_selected: bool,
    /// When this parameter was first observed.
    pub discovered_at: DateTime<Utc>,
}

/// Title-case a `snake_case` or `kebab-case` metric key for use as a default
/// display name, e.g. `spindle_temp` -> `Spindle Temp`.
#[must_use]
pub fn title_case_key(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl DeviceParameter {
    /// Construct the row that parameter discovery inserts for a newly
    /// observed metric key.
    #[must_use]
    pub fn discovered(
        id: ParameterId,
        factory_id: FactoryId,
        device_id: DeviceId,
        parameter_key: String,
        data_type: DataType,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        let display_name = title_case_key(&parameter_key);
        Self {
            id,
            factory_id,
            device_id,
            parameter_key,
            display_name,
            unit: None,
            data_type,
            is_kpi_selected: true,
            discovered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_snake_keys() {
        assert_eq!(title_case_key("spindle_temp"), "Spindle Temp");
        assert_eq!(title_case_key("voltage"), "Voltage");
        assert_eq!(title_case_key("coolant-flow"), "Coolant Flow");
    }
}
