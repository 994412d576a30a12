//! Constructs the pluggable backends named by [`crate::config::DaemonConfig`]
//! as trait objects, so the rest of the binary wires together against
//! `Arc<dyn RelationalStore>` / `Arc<dyn SharedCache>` / `Arc<dyn WorkQueue>`
//! without caring which concrete backend was selected.

use std::sync::Arc;

use factoryops_queue::{MemoryWorkQueue, WorkQueue};
use factoryops_queue_postgres::{run_migrations, PostgresQueueConfig, PostgresWorkQueue};
use factoryops_state::SharedCache;
use factoryops_state_memory::MemorySharedCache;
use factoryops_state_redis::{RedisConfig, RedisSharedCache};
use factoryops_store::{PostgresConfig, PostgresStore, RelationalStore};
use sqlx::postgres::PgPoolOptions;

use crate::config::{CacheBackend, DaemonConfig, QueueBackend, StoreBackend};

/// Build the configured relational store.
///
/// # Errors
///
/// Returns an error if a Postgres backend was selected and connecting or
/// running migrations fails.
pub async fn build_store(config: &DaemonConfig) -> anyhow::Result<Arc<dyn RelationalStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("relational store: in-memory");
            Ok(Arc::new(factoryops_store::InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pg_config = PostgresConfig::from_env();
            tracing::info!(url = %pg_config.url, "relational store: postgres");
            let store = PostgresStore::connect(pg_config).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the configured shared cache.
///
/// # Errors
///
/// Returns an error if a Redis backend was selected and the pool could not
/// be built.
pub fn build_cache(config: &DaemonConfig) -> anyhow::Result<Arc<dyn SharedCache>> {
    match config.cache_backend {
        CacheBackend::Memory => {
            tracing::info!("shared cache: in-memory");
            Ok(Arc::new(MemorySharedCache::new()))
        }
        CacheBackend::Redis => {
            let redis_config = RedisConfig::from_env();
            tracing::info!(url = %redis_config.url, "shared cache: redis");
            let cache = RedisSharedCache::new(&redis_config)?;
            Ok(Arc::new(cache))
        }
    }
}

/// Build the configured work queue.
///
/// # Errors
///
/// Returns an error if a Postgres backend was selected and connecting or
/// running migrations fails.
pub async fn build_queue(config: &DaemonConfig) -> anyhow::Result<Arc<dyn WorkQueue>> {
    match config.queue_backend {
        QueueBackend::Memory => {
            tracing::info!("work queue: in-memory");
            Ok(Arc::new(MemoryWorkQueue::new()))
        }
        QueueBackend::Postgres => {
            let queue_config = PostgresQueueConfig::from_env();
            tracing::info!(url = %queue_config.url, "work queue: postgres");
            let pool = PgPoolOptions::new()
                .max_connections(queue_config.pool_size)
                .connect(&queue_config.url)
                .await?;
            run_migrations(&pool, &queue_config).await?;
            Ok(Arc::new(PostgresWorkQueue::new(pool, queue_config)))
        }
    }
}
