//! Relational persistence for the factory/device/rule/alert data model.
//!
//! This crate owns the entities the shared cache in `factoryops-state` only
//! caches: the system of record is always this store, with Redis as an
//! accelerator in front of it. See [`RelationalStore`] for the full
//! operation set and [`postgres::PostgresStore`] / [`memory::InMemoryStore`]
//! for the two implementations.

pub mod config;
pub mod error;
pub mod health;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod traits;

pub use config::PostgresConfig;
pub use error::StoreError;
pub use health::ActiveAlertCounts;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use traits::{NewAlert, NewDevice, RelationalStore};
