//! Redis backend for [`factoryops_state::SharedCache`].

pub mod config;
pub mod store;

pub use config::RedisConfig;
pub use store::RedisSharedCache;
