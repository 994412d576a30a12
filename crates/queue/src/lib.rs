//! Named FIFO work queues: `rule_engine`, `analytics`, `reporting`,
//! `notifications`. See [`WorkQueue`] for the operation set and
//! [`memory::MemoryWorkQueue`] for the in-process implementation used in
//! tests and local development; the durable Postgres-backed implementation
//! lives in the sibling `factoryops-queue-postgres` crate.

pub mod backoff;
pub mod error;
pub mod memory;
pub mod queue_name;
pub mod traits;
pub mod types;

pub use backoff::BackoffPolicy;
pub use error::QueueError;
pub use memory::MemoryWorkQueue;
pub use queue_name::QueueName;
pub use traits::WorkQueue;
pub use types::{Task, Ticket, DEFAULT_MAX_RETRIES, MAX_PAYLOAD_BYTES};
