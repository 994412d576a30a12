//! The work-queue boundary every backend (in-memory, Postgres) implements.

use async_trait::async_trait;

use crate::error::QueueError;
use crate::queue_name::QueueName;
use crate::types::{Task, Ticket};

/// A named, durable FIFO queue with per-queue concurrency caps, retry with
/// backoff, and dead-lettering after [`crate::DEFAULT_MAX_RETRIES`].
///
/// `analytics` and `reporting` are submit-only from this crate's point of
/// view: something outside this workspace consumes them.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue an opaque payload. Rejects payloads over
    /// [`crate::MAX_PAYLOAD_BYTES`] with [`QueueError::PayloadTooLarge`].
    async fn submit(&self, queue: QueueName, payload: Vec<u8>) -> Result<Ticket, QueueError>;

    /// Pull up to `max_in_flight` ready tasks from `queue`. Tasks returned
    /// here are considered in flight until `ack`ed or `nack`ed; if neither
    /// happens before the backend's visibility timeout elapses, the task
    /// becomes available for redelivery.
    async fn consume(&self, queue: QueueName, max_in_flight: usize) -> Result<Vec<Task>, QueueError>;

    /// Acknowledge successful processing; the task is removed permanently.
    async fn ack(&self, ticket: Ticket) -> Result<(), QueueError>;

    /// Signal failed processing. When `requeue` is true and the task has
    /// not exhausted [`crate::DEFAULT_MAX_RETRIES`], it becomes visible
    /// again after a backoff delay; otherwise (or once retries are
    /// exhausted) it is moved to the dead letter set.
    async fn nack(&self, ticket: Ticket, requeue: bool) -> Result<(), QueueError>;
}
