//! Errors from a [`crate::WorkQueue`] implementation.

use thiserror::Error;

/// Errors a [`crate::WorkQueue`] backend can raise.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue has no free concurrency slots and the bounded wait elapsed.
    #[error("queue {queue} is saturated")]
    Saturated {
        /// The queue that was full.
        queue: &'static str,
    },
    /// `submit` was called with a payload over [`crate::MAX_PAYLOAD_BYTES`].
    #[error("payload of {len} bytes exceeds the {} byte limit", crate::MAX_PAYLOAD_BYTES)]
    PayloadTooLarge {
        /// The rejected payload's length.
        len: usize,
    },
    /// `ack`/`nack` referenced a ticket that is not currently in flight.
    #[error("unknown or already-resolved ticket")]
    UnknownTicket,
    /// The backend itself failed (connection, I/O).
    #[error("queue backend error: {0}")]
    Backend(String),
}
