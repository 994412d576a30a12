//! Error kinds the ingestion coordinator distinguishes, matching the policy
//! table for topic/payload/identity/store/queue failures: some are logged
//! and acked (the message is dropped), others are retried.

use factoryops_queue::QueueError;
use factoryops_state::CacheError;
use factoryops_store::StoreError;
use thiserror::Error;

/// Errors raised while processing one ingested telemetry message.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Topic did not match `factories/{slug}/devices/{device_key}/telemetry`.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Payload was not a well-formed `{timestamp?, metrics}` JSON object.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The topic's factory slug has no matching row.
    #[error("unknown factory slug: {0}")]
    UnknownFactory(String),

    /// A relational/cache/time-series call failed but is expected to clear
    /// on retry.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// The `rule_engine` queue was saturated past the bounded wait.
    #[error("rule dispatch queue saturated")]
    TransientQueue,

    /// A relational call failed with a non-retryable constraint violation.
    #[error("permanent store error: {0}")]
    PermanentStore(String),

    /// The coordinator is shutting down and is no longer accepting work.
    #[error("coordinator is shutting down")]
    Shutdown,
}

impl IngestError {
    /// True if the caller should negative-ack and allow broker redelivery,
    /// as opposed to acking and dropping the message permanently.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::TransientQueue)
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Connection(msg) | StoreError::Transient(msg) => Self::TransientStore(msg),
            StoreError::Permanent(msg) => Self::PermanentStore(msg),
        }
    }
}

impl From<CacheError> for IngestError {
    fn from(e: CacheError) -> Self {
        Self::TransientStore(e.to_string())
    }
}

impl From<QueueError> for IngestError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Saturated { .. } => Self::TransientQueue,
            other => Self::TransientStore(other.to_string()),
        }
    }
}
