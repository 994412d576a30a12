//! Shared-cache trait abstraction for the telemetry and alerting path.
//!
//! This is the "shared cache" tier in the identity cache design: the layer
//! between an in-process map and the relational store. It is deliberately
//! narrow — get/set/delete with TTL, plus publish/subscribe for cache
//! invalidation — because everything more elaborate (single-flight
//! coalescing, negative-cache policy, tiering) lives above it in the
//! ingestion coordinator and alerting worker.

pub mod error;
pub mod keys;
pub mod store;
pub mod testing;

pub use error::CacheError;
pub use store::{CacheLookup, NegativeCacheExt, SharedCache, NEGATIVE_SENTINEL};
