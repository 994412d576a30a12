//! Durable PostgreSQL-backed [`factoryops_queue::WorkQueue`]: tasks survive
//! process restarts and can be consumed by any number of worker processes
//! pointed at the same database, using `SELECT ... FOR UPDATE SKIP LOCKED`
//! to claim work without double-delivery.

pub mod config;
pub mod error;
pub mod migrations;
pub mod store;

pub use config::PostgresQueueConfig;
pub use migrations::run_migrations;
pub use store::PostgresWorkQueue;
