use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::stream::BoxStream;
use futures::StreamExt as _;
use redis::AsyncCommands;

use factoryops_state::{CacheError, SharedCache};

use crate::config::RedisConfig;

/// Redis-backed implementation of [`SharedCache`], the shared cache tier
/// behind the identity cache, rule cache and last-seen mirror.
///
/// Uses a `deadpool-redis` connection pool. Values are plain Redis strings
/// with `SET EX` TTLs; invalidation fan-out uses Redis pub/sub so every
/// process's in-process cache layer observes CRUD writes within seconds.
pub struct RedisSharedCache {
    pool: Pool,
    client: redis::Client,
    prefix: String,
}

impl RedisSharedCache {
    /// Create a new `RedisSharedCache` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the pool or pub/sub client
    /// cannot be constructed.
    pub fn new(config: &RedisConfig) -> Result<Self, CacheError> {
        let url = config.effective_url();
        let cfg = Config::from_url(&url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| CacheError::Connection(e.to_string()))?
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self {
            pool,
            client,
            prefix: config.prefix.clone(),
        })
    }

    fn render(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        conn.get(self.render(key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let rendered = self.render(key);
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                let _: () = conn
                    .set_ex(rendered, value, secs)
                    .await
                    .map_err(|e| CacheError::Backend(e.to_string()))?;
            }
            None => {
                let _: () = conn
                    .set(rendered, value)
                    .await
                    .map_err(|e| CacheError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let _: () = conn
            .del(self.render(key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CacheError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let _: () = conn
            .publish(self.render(channel), message)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, CacheError> {
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let mut pubsub = pubsub;
        pubsub
            .subscribe(self.render(channel))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_configured_prefix() {
        let config = RedisConfig {
            prefix: "fo".into(),
            ..RedisConfig::default()
        };
        let cache = RedisSharedCache {
            pool: Config::from_url(config.effective_url())
                .create_pool(Some(Runtime::Tokio1))
                .unwrap(),
            client: redis::Client::open(config.effective_url()).unwrap(),
            prefix: config.prefix.clone(),
        };
        assert_eq!(cache.render("slug:vpc"), "fo:slug:vpc");
    }
}
