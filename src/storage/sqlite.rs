//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Limitations
//!
//! - **Concurrency**: Limited concurrent writes
//! - **Distributed**: Single-machine, single-instance only

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::config::MonitoringConfig;
use crate::storage::backend::{HealthStatus, Storage};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{
    Alert, AlertStatus, DeviceRecord, HealthFactors, HealthSnapshot, NewAlert, SampleRow,
};
use crate::thresholds::{Condition, NewThresholdRule, ThresholdRule, ThresholdScope, ThresholdValue};
use crate::{DeviceClass, DeviceStatus, Severity};

/// SQLite storage backend
///
/// Stores the device inventory, parameter samples, threshold rules, alerts
/// and health snapshots in a single local database file.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend.
    ///
    /// Creates the database file if missing, runs migrations and configures
    /// WAL mode with a lock-contention retry timeout.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn device_from_row(row: &sqlx::sqlite::SqliteRow) -> DeviceRecord {
        DeviceRecord {
            id: Some(row.get("id")),
            remote_id: row.get("remote_id"),
            class: class_from_str(&row.get::<String, _>("class")),
            name: row.get("name"),
            serial_number: row.get("serial_number"),
            manufacturer: row.get("manufacturer"),
            model: row.get("model"),
            ip_address: row.get("ip_address"),
            status: status_from_str(&row.get::<String, _>("status")),
            last_seen: row
                .get::<Option<i64>, _>("last_seen")
                .map(Self::millis_to_timestamp),
            parent_id: row.get("parent_id"),
            subordinate_count: row.get("subordinate_count"),
        }
    }

    fn threshold_from_row(row: &sqlx::sqlite::SqliteRow) -> StorageResult<ThresholdRule> {
        let value_json: String = row.get("threshold_value");
        let threshold_value: ThresholdValue = serde_json::from_str(&value_json)?;

        Ok(ThresholdRule {
            id: row.get("id"),
            parameter_path: row.get("parameter_path"),
            scope: scope_from_str(&row.get::<String, _>("scope")),
            condition: condition_from_str(&row.get::<String, _>("condition"))?,
            threshold_value,
            severity: severity_from_str(&row.get::<String, _>("severity")),
            enabled: row.get::<i64, _>("enabled") != 0,
            description: row.get("description"),
        })
    }

    fn alert_from_row(row: &sqlx::sqlite::SqliteRow) -> Alert {
        Alert {
            id: row.get("id"),
            severity: severity_from_str(&row.get::<String, _>("severity")),
            title: row.get("title"),
            description: row.get("description"),
            device_id: row.get("device_id"),
            device_class: class_from_str(&row.get::<String, _>("device_class")),
            status: if row.get::<String, _>("status") == "resolved" {
                AlertStatus::Resolved
            } else {
                AlertStatus::Active
            },
            created_at: Self::millis_to_timestamp(row.get("created_at")),
        }
    }

    fn snapshot_from_row(row: &sqlx::sqlite::SqliteRow) -> StorageResult<HealthSnapshot> {
        let factors_json: String = row.get("factors");
        let factors: HealthFactors = serde_json::from_str(&factors_json)?;

        Ok(HealthSnapshot {
            device_id: row.get("device_id"),
            overall: row.get::<i64, _>("overall") as u8,
            connectivity: row.get::<i64, _>("connectivity") as u8,
            performance: row.get::<i64, _>("performance") as u8,
            stability: row.get::<i64, _>("stability") as u8,
            factors,
            calculated_at: Self::millis_to_timestamp(row.get("calculated_at")),
        })
    }
}

fn class_from_str(s: &str) -> DeviceClass {
    match s {
        "olt" => DeviceClass::Olt,
        "onu" => DeviceClass::Onu,
        _ => DeviceClass::Unknown,
    }
}

fn status_from_str(s: &str) -> DeviceStatus {
    match s {
        "online" => DeviceStatus::Online,
        "warning" => DeviceStatus::Warning,
        _ => DeviceStatus::Offline,
    }
}

fn severity_from_str(s: &str) -> Severity {
    match s {
        "critical" => Severity::Critical,
        "warning" => Severity::Warning,
        _ => Severity::Info,
    }
}

fn scope_from_str(s: &str) -> ThresholdScope {
    match s {
        "olt" => ThresholdScope::Olt,
        "onu" => ThresholdScope::Onu,
        _ => ThresholdScope::All,
    }
}

fn condition_from_str(s: &str) -> StorageResult<Condition> {
    match s {
        "greater_than" => Ok(Condition::GreaterThan),
        "less_than" => Ok(Condition::LessThan),
        "equals" => Ok(Condition::Equals),
        "not_equals" => Ok(Condition::NotEquals),
        "contains" => Ok(Condition::Contains),
        other => Err(StorageError::QueryFailed(format!(
            "unknown threshold condition '{other}'"
        ))),
    }
}

fn condition_to_str(condition: Condition) -> &'static str {
    match condition {
        Condition::GreaterThan => "greater_than",
        Condition::LessThan => "less_than",
        Condition::Equals => "equals",
        Condition::NotEquals => "not_equals",
        Condition::Contains => "contains",
    }
}

fn scope_to_str(scope: ThresholdScope) -> &'static str {
    match scope {
        ThresholdScope::All => "all",
        ThresholdScope::Olt => "olt",
        ThresholdScope::Onu => "onu",
    }
}

#[async_trait]
impl Storage for SqliteBackend {
    #[instrument(skip(self, device), fields(serial = %device.serial_number))]
    async fn upsert_device(&self, mut device: DeviceRecord) -> StorageResult<DeviceRecord> {
        let last_seen = device.last_seen.as_ref().map(Self::timestamp_to_millis);

        match device.id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE devices SET
                        remote_id = ?, class = ?, name = ?, serial_number = ?,
                        manufacturer = ?, model = ?, ip_address = ?, status = ?,
                        last_seen = ?, parent_id = ?, subordinate_count = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&device.remote_id)
                .bind(device.class.to_string())
                .bind(&device.name)
                .bind(&device.serial_number)
                .bind(&device.manufacturer)
                .bind(&device.model)
                .bind(&device.ip_address)
                .bind(device.status.to_string())
                .bind(last_seen)
                .bind(device.parent_id)
                .bind(device.subordinate_count)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

                Ok(device)
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO devices (
                        remote_id, class, name, serial_number, manufacturer,
                        model, ip_address, status, last_seen, parent_id,
                        subordinate_count
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&device.remote_id)
                .bind(device.class.to_string())
                .bind(&device.name)
                .bind(&device.serial_number)
                .bind(&device.manufacturer)
                .bind(&device.model)
                .bind(&device.ip_address)
                .bind(device.status.to_string())
                .bind(last_seen)
                .bind(device.parent_id)
                .bind(device.subordinate_count)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

                device.id = Some(result.last_insert_rowid());
                Ok(device)
            }
        }
    }

    async fn find_device_by_remote_id(
        &self,
        remote_id: &str,
    ) -> StorageResult<Option<DeviceRecord>> {
        let row = sqlx::query("SELECT * FROM devices WHERE remote_id = ?")
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|row| Self::device_from_row(&row)))
    }

    async fn find_device_by_fallback_key(
        &self,
        class: DeviceClass,
        key: &str,
    ) -> StorageResult<Option<DeviceRecord>> {
        let column = match class {
            DeviceClass::Olt => "name",
            DeviceClass::Onu | DeviceClass::Unknown => "serial_number",
        };

        let sql = format!("SELECT * FROM devices WHERE class = ? AND {column} = ?");
        let row = sqlx::query(&sql)
            .bind(class.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|row| Self::device_from_row(&row)))
    }

    async fn list_devices(&self) -> StorageResult<Vec<DeviceRecord>> {
        let rows = sqlx::query("SELECT * FROM devices ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::device_from_row).collect())
    }

    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn insert_samples_batch(&self, samples: Vec<SampleRow>) -> StorageResult<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        // Transaction for atomicity; OR IGNORE makes replayed ticks harmless
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let mut inserted = 0;
        for sample in samples {
            let value_json = serde_json::to_string(&sample.value)?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO parameter_samples (
                    device_id, parameter_path, value, unit, timestamp
                )
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&sample.device_id)
            .bind(&sample.parameter_path)
            .bind(value_json)
            .bind(&sample.unit)
            .bind(Self::timestamp_to_millis(&sample.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        debug!("batch insert complete, {} new samples", inserted);
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn query_samples_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, parameter_path, value, unit, timestamp
            FROM parameter_samples
            WHERE device_id = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(device_id)
        .bind(Self::timestamp_to_millis(&start))
        .bind(Self::timestamp_to_millis(&end))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let value_json: String = row.get("value");
                let value: serde_json::Value = serde_json::from_str(&value_json)?;
                Ok(SampleRow {
                    device_id: row.get("device_id"),
                    parameter_path: row.get("parameter_path"),
                    value,
                    unit: row.get("unit"),
                    timestamp: Self::millis_to_timestamp(row.get("timestamp")),
                })
            })
            .collect()
    }

    async fn create_threshold(&self, rule: NewThresholdRule) -> StorageResult<ThresholdRule> {
        let value_json = serde_json::to_string(&rule.threshold_value)?;

        let result = sqlx::query(
            r#"
            INSERT INTO parameter_thresholds (
                parameter_path, scope, condition, threshold_value,
                severity, enabled, description
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.parameter_path)
        .bind(scope_to_str(rule.scope))
        .bind(condition_to_str(rule.condition))
        .bind(value_json)
        .bind(rule.severity.to_string())
        .bind(rule.enabled as i64)
        .bind(&rule.description)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(ThresholdRule {
            id: result.last_insert_rowid(),
            parameter_path: rule.parameter_path,
            scope: rule.scope,
            condition: rule.condition,
            threshold_value: rule.threshold_value,
            severity: rule.severity,
            enabled: rule.enabled,
            description: rule.description,
        })
    }

    async fn list_enabled_thresholds(&self) -> StorageResult<Vec<ThresholdRule>> {
        let rows = sqlx::query("SELECT * FROM parameter_thresholds WHERE enabled = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::threshold_from_row).collect()
    }

    async fn find_active_alert(
        &self,
        device_id: &str,
        title: &str,
    ) -> StorageResult<Option<Alert>> {
        let row = sqlx::query(
            "SELECT * FROM alerts WHERE device_id = ? AND title = ? AND status = 'active'",
        )
        .bind(device_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|row| Self::alert_from_row(&row)))
    }

    async fn create_alert(&self, alert: NewAlert) -> StorageResult<Alert> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                severity, title, description, device_id, device_class,
                status, created_at
            )
            VALUES (?, ?, ?, ?, ?, 'active', ?)
            "#,
        )
        .bind(alert.severity.to_string())
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.device_id)
        .bind(alert.device_class.to_string())
        .bind(Self::timestamp_to_millis(&created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(Alert {
            id: result.last_insert_rowid(),
            severity: alert.severity,
            title: alert.title,
            description: alert.description,
            device_id: alert.device_id,
            device_class: alert.device_class,
            status: AlertStatus::Active,
            created_at,
        })
    }

    async fn list_alerts(&self, device_id: &str) -> StorageResult<Vec<Alert>> {
        let rows = sqlx::query("SELECT * FROM alerts WHERE device_id = ? ORDER BY created_at DESC")
            .bind(device_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(Self::alert_from_row).collect())
    }

    async fn upsert_health_snapshot(&self, snapshot: HealthSnapshot) -> StorageResult<()> {
        let factors_json = serde_json::to_string(&snapshot.factors)?;

        sqlx::query(
            r#"
            INSERT INTO health_snapshots (
                device_id, overall, connectivity, performance, stability,
                factors, calculated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (device_id) DO UPDATE SET
                overall = excluded.overall,
                connectivity = excluded.connectivity,
                performance = excluded.performance,
                stability = excluded.stability,
                factors = excluded.factors,
                calculated_at = excluded.calculated_at
            "#,
        )
        .bind(&snapshot.device_id)
        .bind(snapshot.overall as i64)
        .bind(snapshot.connectivity as i64)
        .bind(snapshot.performance as i64)
        .bind(snapshot.stability as i64)
        .bind(factors_json)
        .bind(Self::timestamp_to_millis(&snapshot.calculated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn get_health_snapshot(&self, device_id: &str) -> StorageResult<Option<HealthSnapshot>> {
        let row = sqlx::query("SELECT * FROM health_snapshots WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.map(|row| Self::snapshot_from_row(&row)).transpose()
    }

    async fn latest_health_snapshots(&self, limit: usize) -> StorageResult<Vec<HealthSnapshot>> {
        let rows =
            sqlx::query("SELECT * FROM health_snapshots ORDER BY calculated_at DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::snapshot_from_row).collect()
    }

    async fn upsert_config(&self, config: MonitoringConfig) -> StorageResult<()> {
        let config_json = serde_json::to_string(&config)?;
        let last_sync = config.last_sync.as_ref().map(Self::timestamp_to_millis);

        sqlx::query(
            r#"
            INSERT INTO monitoring_configs (id, config, last_sync)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                config = excluded.config,
                last_sync = COALESCE(excluded.last_sync, monitoring_configs.last_sync)
            "#,
        )
        .bind(&config.id)
        .bind(config_json)
        .bind(last_sync)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn get_config(&self, id: &str) -> StorageResult<Option<MonitoringConfig>> {
        let row = sqlx::query("SELECT config, last_sync FROM monitoring_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.map(|row| {
            let config_json: String = row.get("config");
            let mut config: MonitoringConfig = serde_json::from_str(&config_json)?;
            // the column is the source of truth for sync bookkeeping
            config.last_sync = row
                .get::<Option<i64>, _>("last_sync")
                .map(Self::millis_to_timestamp);
            Ok(config)
        })
        .transpose()
    }

    async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query("UPDATE monitoring_configs SET last_sync = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&at))
            .bind(config_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let devices: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let samples: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM parameter_samples")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let alerts: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let file_size_mb = file_size as f64 / 1_000_000.0;

        Ok(format!(
            "SQLite: {} devices, {} samples, {} alerts, {:.2} MB on disk",
            devices.0, samples.0, alerts.0, file_size_mb
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
