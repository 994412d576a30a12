//! Errors raised while handling one `rule_engine` task or computing a
//! health/staleness snapshot.

use factoryops_queue::QueueError;
use factoryops_rules::EvalError;
use factoryops_state::CacheError;
use factoryops_store::StoreError;
use thiserror::Error;

/// Errors from the alerting worker and health computer.
#[derive(Debug, Error)]
pub enum AlertingError {
    /// A relational call failed but is expected to clear on retry.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// A relational call failed with a non-retryable constraint violation.
    #[error("permanent store error: {0}")]
    PermanentStore(String),

    /// A shared-cache call failed.
    #[error("transient cache error: {0}")]
    TransientCache(String),

    /// The `notifications` queue was saturated past the bounded wait.
    #[error("notification dispatch queue saturated")]
    TransientQueue,

    /// The factory referenced by a task no longer exists.
    #[error("unknown factory: {0}")]
    UnknownFactory(i64),

    /// A rule's condition tree was malformed in a way C5 could not resolve.
    #[error("rule evaluator error: {0}")]
    EvaluatorBug(#[from] EvalError),
}

impl AlertingError {
    /// True if the caller should nack with `requeue = true`, as opposed to
    /// dead-lettering the task outright.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::TransientCache(_) | Self::TransientQueue)
    }
}

impl From<StoreError> for AlertingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Connection(msg) | StoreError::Transient(msg) => Self::TransientStore(msg),
            StoreError::Permanent(msg) => Self::PermanentStore(msg),
        }
    }
}

impl From<CacheError> for AlertingError {
    fn from(e: CacheError) -> Self {
        Self::TransientCache(e.to_string())
    }
}

impl From<QueueError> for AlertingError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Saturated { .. } => Self::TransientQueue,
            other => Self::TransientStore(other.to_string()),
        }
    }
}
