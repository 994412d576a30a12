use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Create the relational tables this crate owns, if they do not already
/// exist. `analytics_jobs` and `reports` are owned by out-of-scope
/// components and are not created here.
///
/// Every row-owning table carries a `factory_id` column with an index,
/// enforcing the universal isolation invariant at the storage boundary.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let factories = config.factories_table();
    let devices = config.devices_table();
    let parameters = config.device_parameters_table();
    let rules = config.rules_table();
    let rule_devices = config.rule_devices_table();
    let alerts = config.alerts_table();
    let cooldowns = config.rule_cooldowns_table();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {factories} (
            id BIGSERIAL PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            timezone TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {devices} (
            id BIGSERIAL PRIMARY KEY,
            factory_id BIGINT NOT NULL REFERENCES {factories}(id),
            device_key TEXT NOT NULL,
            name TEXT,
            manufacturer TEXT,
            model TEXT,
            region TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            last_seen TIMESTAMPTZ,
            UNIQUE (factory_id, device_key)
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {}_devices_factory_idx ON {devices} (factory_id)",
        config.table_prefix
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {parameters} (
            id BIGSERIAL PRIMARY KEY,
            factory_id BIGINT NOT NULL REFERENCES {factories}(id),
            device_id BIGINT NOT NULL REFERENCES {devices}(id),
            parameter_key TEXT NOT NULL,
            display_name TEXT NOT NULL,
            unit TEXT,
            data_type TEXT NOT NULL,
            is_kpi_selected BOOLEAN NOT NULL DEFAULT TRUE,
            discovered_at TIMESTAMPTZ NOT NULL,
            UNIQUE (device_id, parameter_key)
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {}_parameters_factory_idx ON {parameters} (factory_id)",
        config.table_prefix
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {rules} (
            id BIGSERIAL PRIMARY KEY,
            factory_id BIGINT NOT NULL REFERENCES {factories}(id),
            name TEXT NOT NULL,
            description TEXT,
            scope TEXT NOT NULL,
            conditions JSONB NOT NULL,
            cooldown_minutes BIGINT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            schedule_type TEXT NOT NULL,
            schedule_config JSONB NOT NULL,
            severity TEXT NOT NULL,
            notification_channels JSONB NOT NULL
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {}_rules_factory_idx ON {rules} (factory_id)",
        config.table_prefix
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {rule_devices} (
            rule_id BIGINT NOT NULL REFERENCES {rules}(id),
            device_id BIGINT NOT NULL REFERENCES {devices}(id),
            PRIMARY KEY (rule_id, device_id)
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {alerts} (
            id BIGSERIAL PRIMARY KEY,
            factory_id BIGINT NOT NULL REFERENCES {factories}(id),
            rule_id BIGINT NOT NULL REFERENCES {rules}(id),
            device_id BIGINT NOT NULL REFERENCES {devices}(id),
            triggered_at TIMESTAMPTZ NOT NULL,
            resolved_at TIMESTAMPTZ,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            telemetry_snapshot JSONB NOT NULL,
            notification_sent BOOLEAN NOT NULL DEFAULT FALSE
        )"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {}_alerts_factory_idx ON {alerts} (factory_id)",
        config.table_prefix
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {}_alerts_active_idx ON {alerts} (factory_id) WHERE resolved_at IS NULL",
        config.table_prefix
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {cooldowns} (
            rule_id BIGINT NOT NULL REFERENCES {rules}(id),
            device_id BIGINT NOT NULL REFERENCES {devices}(id),
            last_triggered TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (rule_id, device_id)
        )"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
