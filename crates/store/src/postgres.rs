use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use factoryops_core::{
    Alert, DataType, Device, DeviceId, DeviceParameter, Factory, FactoryId, NotificationChannel,
    ParameterId, Rule, RuleId, RuleScope, ScheduleConfig, ScheduleType, Severity,
};

use crate::config::PostgresConfig;
use crate::error::StoreError;
use crate::health::ActiveAlertCounts;
use crate::migrations;
use crate::traits::{NewAlert, NewDevice, RelationalStore};

/// PostgreSQL-backed [`RelationalStore`].
///
/// All mutating operations use row-level conditional writes (`INSERT ...
/// ON CONFLICT`) or short transactions; no long-running transaction is ever
/// held across a call to another system.
pub struct PostgresStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresStore {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created, or
    /// a wrapped `sqlx::Error` if migrations fail.
    pub async fn connect(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        migrations::run_migrations(&pool, &config).await?;
        Ok(Self { pool, config })
    }

    fn device_from_row(row: &sqlx::postgres::PgRow) -> Result<Device, StoreError> {
        Ok(Device {
            id: DeviceId::new(row.try_get("id")?),
            factory_id: FactoryId::new(row.try_get("factory_id")?),
            device_key: row.try_get("device_key")?,
            name: row.try_get("name")?,
            manufacturer: row.try_get("manufacturer")?,
            model: row.try_get("model")?,
            region: row.try_get("region")?,
            is_active: row.try_get("is_active")?,
            last_seen: row.try_get("last_seen")?,
        })
    }

    fn rule_from_row(row: &sqlx::postgres::PgRow) -> Result<Rule, StoreError> {
        let scope: String = row.try_get("scope")?;
        let schedule_type: String = row.try_get("schedule_type")?;
        let severity: String = row.try_get("severity")?;
        let conditions_json: serde_json::Value = row.try_get("conditions")?;
        let schedule_config_json: serde_json::Value = row.try_get("schedule_config")?;
        let channels_json: serde_json::Value = row.try_get("notification_channels")?;
        let device_ids_json: serde_json::Value = row
            .try_get("device_ids")
            .unwrap_or(serde_json::Value::Array(vec![]));

        Ok(Rule {
            id: RuleId::new(row.try_get("id")?),
            factory_id: FactoryId::new(row.try_get("factory_id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            scope: match scope.as_str() {
                "device" => RuleScope::Device,
                _ => RuleScope::Global,
            },
            conditions: serde_json::from_value(conditions_json)
                .map_err(|e| StoreError::Permanent(e.to_string()))?,
            cooldown_minutes: row.try_get("cooldown_minutes")?,
            is_active: row.try_get("is_active")?,
            schedule_type: match schedule_type.as_str() {
                "time_window" => ScheduleType::TimeWindow,
                "date_range" => ScheduleType::DateRange,
                _ => ScheduleType::Always,
            },
            schedule_config: serde_json::from_value::<ScheduleConfig>(schedule_config_json)
                .map_err(|e| StoreError::Permanent(e.to_string()))?,
            severity: match severity.as_str() {
                "low" => Severity::Low,
                "medium" => Severity::Medium,
                "critical" => Severity::Critical,
                _ => Severity::High,
            },
            notification_channels: serde_json::from_value::<Vec<NotificationChannel>>(
                channels_json,
            )
            .map_err(|e| StoreError::Permanent(e.to_string()))?,
            device_ids: serde_json::from_value::<Vec<i64>>(device_ids_json)
                .unwrap_or_default()
                .into_iter()
                .map(DeviceId::new)
                .collect(),
        })
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn get_factory_by_slug(&self, slug: &str) -> Result<Option<Factory>, StoreError> {
        let table = self.config.factories_table();
        let row = sqlx::query(&format!(
            "SELECT id, slug, name, timezone, is_active FROM {table} WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let tz_name: String = row.try_get("timezone")?;
            Ok(Factory {
                id: FactoryId::new(row.try_get("id")?),
                slug: row.try_get("slug")?,
                name: row.try_get("name")?,
                timezone: chrono_tz::Tz::from_str(&tz_name)
                    .map_err(|e| StoreError::Permanent(e.to_string()))?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn get_factory(&self, factory_id: FactoryId) -> Result<Option<Factory>, StoreError> {
        let table = self.config.factories_table();
        let row = sqlx::query(&format!(
            "SELECT id, slug, name, timezone, is_active FROM {table} WHERE id = $1"
        ))
        .bind(factory_id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let tz_name: String = row.try_get("timezone")?;
            Ok(Factory {
                id: FactoryId::new(row.try_get("id")?),
                slug: row.try_get("slug")?,
                name: row.try_get("name")?,
                timezone: chrono_tz::Tz::from_str(&tz_name)
                    .map_err(|e| StoreError::Permanent(e.to_string()))?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn get_device(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Option<Device>, StoreError> {
        let table = self.config.devices_table();
        let row = sqlx::query(&format!(
            "SELECT id, factory_id, device_key, name, manufacturer, model, region, is_active, last_seen \
             FROM {table} WHERE id = $1 AND factory_id = $2"
        ))
        .bind(device_id.get())
        .bind(factory_id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::device_from_row).transpose()
    }

    async fn get_device_by_key(
        &self,
        factory_id: FactoryId,
        device_key: &str,
    ) -> Result<Option<Device>, StoreError> {
        let table = self.config.devices_table();
        let row = sqlx::query(&format!(
            "SELECT id, factory_id, device_key, name, manufacturer, model, region, is_active, last_seen \
             FROM {table} WHERE factory_id = $1 AND device_key = $2"
        ))
        .bind(factory_id.get())
        .bind(device_key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::device_from_row).transpose()
    }

    async fn list_devices(&self, factory_id: FactoryId) -> Result<Vec<Device>, StoreError> {
        let table = self.config.devices_table();
        let rows = sqlx::query(&format!(
            "SELECT id, factory_id, device_key, name, manufacturer, model, region, is_active, last_seen \
             FROM {table} WHERE factory_id = $1"
        ))
        .bind(factory_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::device_from_row).collect()
    }

    async fn insert_device_if_absent(&self, device: NewDevice) -> Result<Device, StoreError> {
        let table = self.config.devices_table();
        let inserted = sqlx::query(&format!(
            "INSERT INTO {table} (factory_id, device_key, is_active) VALUES ($1, $2, TRUE) \
             ON CONFLICT (factory_id, device_key) DO NOTHING \
             RETURNING id, factory_id, device_key, name, manufacturer, model, region, is_active, last_seen"
        ))
        .bind(device.factory_id.get())
        .bind(&device.device_key)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted.as_ref() {
            return Self::device_from_row(row);
        }

        // Another worker won the insert race; re-read the winner.
        self.get_device_by_key(device.factory_id, &device.device_key)
            .await?
            .ok_or_else(|| {
                StoreError::Transient("device insert conflicted but re-read found nothing".into())
            })
    }

    async fn device_parameter_keys(&self, device_id: DeviceId) -> Result<Vec<String>, StoreError> {
        let table = self.config.device_parameters_table();
        let rows = sqlx::query(&format!(
            "SELECT parameter_key FROM {table} WHERE device_id = $1"
        ))
        .bind(device_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| r.try_get::<String, _>("parameter_key").map_err(Into::into))
            .collect()
    }

    async fn insert_parameter_if_absent(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
        parameter_key: &str,
        data_type: DataType,
        discovered_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let table = self.config.device_parameters_table();
        let display_name = factoryops_core::parameter::title_case_key(parameter_key);
        let data_type_str = match data_type {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
        };
        let result = sqlx::query(&format!(
            "INSERT INTO {table} \
             (factory_id, device_id, parameter_key, display_name, data_type, is_kpi_selected, discovered_at) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6) \
             ON CONFLICT (device_id, parameter_key) DO NOTHING"
        ))
        .bind(factory_id.get())
        .bind(device_id.get())
        .bind(parameter_key)
        .bind(&display_name)
        .bind(data_type_str)
        .bind(discovered_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_parameters(
        &self,
        device_id: DeviceId,
    ) -> Result<Vec<DeviceParameter>, StoreError> {
        let table = self.config.device_parameters_table();
        let rows = sqlx::query(&format!(
            "SELECT id, factory_id, device_id, parameter_key, display_name, unit, data_type, \
             is_kpi_selected, discovered_at FROM {table} WHERE device_id = $1"
        ))
        .bind(device_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let data_type: String = row.try_get("data_type")?;
                Ok(DeviceParameter {
                    id: ParameterId::new(row.try_get("id")?),
                    factory_id: FactoryId::new(row.try_get("factory_id")?),
                    device_id: DeviceId::new(row.try_get("device_id")?),
                    parameter_key: row.try_get("parameter_key")?,
                    display_name: row.try_get("display_name")?,
                    unit: row.try_get("unit")?,
                    data_type: match data_type.as_str() {
                        "int" => DataType::Int,
                        "string" => DataType::String,
                        _ => DataType::Float,
                    },
                    is_kpi_selected: row.try_get("is_kpi_selected")?,
                    discovered_at: row.try_get("discovered_at")?,
                })
            })
            .collect()
    }

    async fn bump_last_seen(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let table = self.config.devices_table();
        sqlx::query(&format!(
            "UPDATE {table} SET last_seen = GREATEST(COALESCE(last_seen, $3), $3) \
             WHERE id = $1 AND factory_id = $2"
        ))
        .bind(device_id.get())
        .bind(factory_id.get())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn candidate_rules(
        &self,
        factory_id: FactoryId,
        device_id: DeviceId,
    ) -> Result<Vec<Rule>, StoreError> {
        let rules = self.config.rules_table();
        let rule_devices = self.config.rule_devices_table();
        let rows = sqlx::query(&format!(
            "SELECT r.id, r.factory_id, r.name, r.description, r.scope, r.conditions, \
             r.cooldown_minutes, r.is_active, r.schedule_type, r.schedule_config, r.severity, \
             r.notification_channels, \
             COALESCE(json_agg(rd.device_id) FILTER (WHERE rd.device_id IS NOT NULL), '[]') AS device_ids \
             FROM {rules} r \
             LEFT JOIN {rule_devices} rd ON rd.rule_id = r.id \
             WHERE r.factory_id = $1 AND r.is_active = TRUE \
               AND (r.scope = 'global' OR EXISTS ( \
                    SELECT 1 FROM {rule_devices} rd2 WHERE rd2.rule_id = r.id AND rd2.device_id = $2)) \
             GROUP BY r.id"
        ))
        .bind(factory_id.get())
        .bind(device_id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::rule_from_row).collect()
    }

    async fn cooldown_last_triggered(
        &self,
        rule_id: RuleId,
        device_id: DeviceId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let table = self.config.rule_cooldowns_table();
        let row = sqlx::query(&format!(
            "SELECT last_triggered FROM {table} WHERE rule_id = $1 AND device_id = $2"
        ))
        .bind(rule_id.get())
        .bind(device_id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.try_get::<DateTime<Utc>, _>("last_triggered").map_err(Into::into))
            .transpose()
    }

    async fn commit_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let alerts = self.config.alerts_table();
        let cooldowns = self.config.rule_cooldowns_table();
        let severity_str = match alert.severity {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        let snapshot_json = serde_json::to_value(&alert.telemetry_snapshot)
            .map_err(|e| StoreError::Permanent(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO {alerts} \
             (factory_id, rule_id, device_id, triggered_at, severity, message, telemetry_snapshot, notification_sent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE) \
             RETURNING id"
        ))
        .bind(alert.factory_id.get())
        .bind(alert.rule_id.get())
        .bind(alert.device_id.get())
        .bind(alert.triggered_at)
        .bind(severity_str)
        .bind(&alert.message)
        .bind(&snapshot_json)
        .fetch_one(&mut *tx)
        .await?;
        let alert_id: i64 = row.try_get("id")?;

        sqlx::query(&format!(
            "INSERT INTO {cooldowns} (rule_id, device_id, last_triggered) VALUES ($1, $2, $3) \
             ON CONFLICT (rule_id, device_id) DO UPDATE SET last_triggered = EXCLUDED.last_triggered"
        ))
        .bind(alert.rule_id.get())
        .bind(alert.device_id.get())
        .bind(alert.triggered_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Alert {
            id: factoryops_core::AlertId::new(alert_id),
            factory_id: alert.factory_id,
            rule_id: alert.rule_id,
            device_id: alert.device_id,
            triggered_at: alert.triggered_at,
            resolved_at: None,
            severity: alert.severity,
            message: alert.message,
            telemetry_snapshot: alert.telemetry_snapshot,
            notification_sent: false,
        })
    }

    async fn active_alert_counts(
        &self,
        factory_id: FactoryId,
    ) -> Result<ActiveAlertCounts, StoreError> {
        let table = self.config.alerts_table();
        let rows = sqlx::query(&format!(
            "SELECT severity, COUNT(*) AS n FROM {table} \
             WHERE factory_id = $1 AND resolved_at IS NULL GROUP BY severity"
        ))
        .bind(factory_id.get())
        .fetch_all(&self.pool)
        .await?;
        let mut counts = ActiveAlertCounts::default();
        for row in rows {
            let severity: String = row.try_get("severity")?;
            let n: i64 = row.try_get("n")?;
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            match severity.as_str() {
                "critical" => counts.critical = n,
                "high" => counts.high = n,
                "medium" => counts.medium = n,
                "low" => counts.low = n,
                _ => {}
            }
        }
        Ok(counts)
    }
}
