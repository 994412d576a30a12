use std::time::Duration;

/// Configuration for the PostgreSQL-backed [`crate::PostgresWorkQueue`].
#[derive(Debug, Clone)]
pub struct PostgresQueueConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Table name prefix.
    pub table_prefix: String,
    /// How long a claimed task stays invisible to other consumers before
    /// it is treated as abandoned and becomes claimable again.
    pub visibility_timeout: Duration,
}

impl Default for PostgresQueueConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgres://localhost/factoryops"),
            pool_size: 10,
            table_prefix: String::from("factoryops"),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

impl PostgresQueueConfig {
    /// Build from `FACTORYOPS_QUEUE_POSTGRES_*` environment variables,
    /// falling back to [`Self::default`] for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("FACTORYOPS_QUEUE_POSTGRES_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("FACTORYOPS_QUEUE_POSTGRES_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_size),
            table_prefix: std::env::var("FACTORYOPS_QUEUE_POSTGRES_TABLE_PREFIX")
                .unwrap_or(defaults.table_prefix),
            visibility_timeout: std::env::var("FACTORYOPS_QUEUE_POSTGRES_VISIBILITY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.visibility_timeout),
        }
    }

    /// Table name for queued tasks.
    #[must_use]
    pub fn tasks_table(&self) -> String {
        format!("{}_queue_tasks", self.table_prefix)
    }

    /// Table name for dead-lettered tasks.
    #[must_use]
    pub fn dead_letters_table(&self) -> String {
        format!("{}_queue_dead_letters", self.table_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = PostgresQueueConfig::default();
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.tasks_table(), "factoryops_queue_tasks");
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let cfg = PostgresQueueConfig::from_env();
        assert_eq!(cfg.table_prefix, "factoryops");
    }
}
