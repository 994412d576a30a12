//! Bridges `sqlx` failures into [`factoryops_queue::QueueError`].

use factoryops_queue::QueueError;

/// Classify a `sqlx::Error` as a queue backend error.
pub(crate) fn backend_error(e: sqlx::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}
