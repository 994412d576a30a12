/// Configuration for the PostgreSQL-backed relational store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Schema/table prefix, to allow several logical stores in one database.
    pub table_prefix: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgres://localhost/factoryops"),
            pool_size: 10,
            table_prefix: String::from("factoryops"),
        }
    }
}

impl PostgresConfig {
    /// Build from `FACTORYOPS_POSTGRES_*` environment variables, falling
    /// back to [`Self::default`] for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("FACTORYOPS_POSTGRES_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("FACTORYOPS_POSTGRES_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_size),
            table_prefix: std::env::var("FACTORYOPS_POSTGRES_TABLE_PREFIX").unwrap_or(defaults.table_prefix),
        }
    }

    /// Table name for factories.
    #[must_use]
    pub fn factories_table(&self) -> String {
        format!("{}_factories", self.table_prefix)
    }

    /// Table name for devices.
    #[must_use]
    pub fn devices_table(&self) -> String {
        format!("{}_devices", self.table_prefix)
    }

    /// Table name for device parameters.
    #[must_use]
    pub fn device_parameters_table(&self) -> String {
        format!("{}_device_parameters", self.table_prefix)
    }

    /// Table name for rules.
    #[must_use]
    pub fn rules_table(&self) -> String {
        format!("{}_rules", self.table_prefix)
    }

    /// Table name for the rule-devices join table.
    #[must_use]
    pub fn rule_devices_table(&self) -> String {
        format!("{}_rule_devices", self.table_prefix)
    }

    /// Table name for alerts.
    #[must_use]
    pub fn alerts_table(&self) -> String {
        format!("{}_alerts", self.table_prefix)
    }

    /// Table name for rule cooldowns.
    #[must_use]
    pub fn rule_cooldowns_table(&self) -> String {
        format!("{}_rule_cooldowns", self.table_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = PostgresConfig::default();
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.factories_table(), "factoryops_factories");
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let cfg = PostgresConfig::from_env();
        assert_eq!(cfg.table_prefix, "factoryops");
    }
}
