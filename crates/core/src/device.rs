//! Equipment publishing telemetry under one `device_key`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, FactoryId};

/// Maximum length of a device key, per the data model.
pub const MAX_DEVICE_KEY_LEN: usize = 100;

/// A piece of equipment in one factory, identified within that factory by
/// `device_key`. Devices are never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable numeric identifier.
    pub id: DeviceId,
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Unique within `factory_id` (≤100 chars). Taken verbatim from the MQTT topic.
    pub device_key: String,
    /// Optional operator-assigned display name.
    pub name: Option<String>,
    /// Optional manufacturer metadata.
    pub manufacturer: Option<String>,
    /// Optional model metadata.
    pub model: Option<String>,
    /// Optional region/site metadata.
    pub region: Option<String>,
    /// Whether the device currently accepts telemetry.
    pub is_active: bool,
    /// Timestamp of the most recent accepted telemetry message, if any.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Construct a device record as it would be auto-created on first sighting:
    /// active, no prior telemetry, no operator-supplied metadata.
    #[must_use]
    pub fn auto_created(id: DeviceId, factory_id: FactoryId, device_key: String) -> Self {
        Self {
            id,
            factory_id,
            device_key,
            name: None,
            manufacturer: None,
            model: None,
            region: None,
            is_active: true,
            last_seen: None,
        }
    }

    /// The default online threshold used by [`crate::health`] staleness checks.
    pub const ONLINE_THRESHOLD_SECS: i64 = 600;

    /// Whether this device counts as online given the current time.
    #[must_use]
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        match self.last_seen {
            Some(ts) => (now - ts).num_seconds() <= Self::ONLINE_THRESHOLD_SECS,
            None => false,
        }
    }
}
