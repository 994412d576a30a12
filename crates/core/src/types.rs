//! Strongly-typed identifiers shared across the telemetry and alerting path.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Construct an identifier from a raw integer.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// The raw integer value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

newtype_id!(FactoryId, "Identifies a tenant factory.");
newtype_id!(DeviceId, "Identifies a device within a factory.");
newtype_id!(ParameterId, "Identifies a device parameter (metric channel).");
newtype_id!(RuleId, "Identifies an alerting rule.");
newtype_id!(AlertId, "Identifies a triggered alert.");
