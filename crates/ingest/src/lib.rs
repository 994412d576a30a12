//! Ingestion coordinator: MQTT subscribe loop, topic/payload parsing,
//! identity resolution, parameter discovery, time-series enqueue, last-seen
//! coalescing and rule-eval dispatch. See [`coordinator::IngestionCoordinator`]
//! for the entry point.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod last_seen;
pub mod parameters;
pub mod payload;
pub mod topic;

pub use config::IngestConfig;
pub use coordinator::{connect, mqtt_options, IngestionCoordinator, RuleEngineTask, TELEMETRY_TOPIC_FILTER};
pub use error::IngestError;
pub use identity::IdentityCache;
pub use last_seen::LastSeenCoalescer;
pub use payload::{parse_payload, ParsedPayload};
pub use topic::{parse_topic, ParsedTopic};
