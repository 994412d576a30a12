//! Ticket and task shapes shared by every [`crate::WorkQueue`] backend.

use crate::queue_name::QueueName;

/// Maximum payload size accepted by `submit`.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Number of failed delivery attempts before a task is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Opaque handle to a submitted task, returned by `submit` and required by
/// `ack`/`nack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Wrap a raw backend-assigned id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id, for backends that need to persist it.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A task handed to a consumer, with enough context to ack or nack it.
#[derive(Debug, Clone)]
pub struct Task {
    /// Handle used to resolve this delivery.
    pub ticket: Ticket,
    /// The queue this task was submitted to.
    pub queue: QueueName,
    /// Opaque payload, at most [`MAX_PAYLOAD_BYTES`].
    pub payload: Vec<u8>,
    /// Zero-based count of prior delivery attempts (0 on first delivery).
    pub attempt: u32,
}
