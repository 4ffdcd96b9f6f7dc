//! Storage backend trait definition

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MonitoringConfig;
use crate::storage::error::StorageResult;
use crate::storage::schema::{Alert, DeviceRecord, HealthSnapshot, NewAlert, SampleRow};
use crate::thresholds::{NewThresholdRule, ThresholdRule};
use crate::DeviceClass;

/// Health status of a storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the backend is healthy
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional details (e.g. database size, row counts)
    pub metadata: HashMap<String, String>,
}

impl HealthStatus {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Trait for storage backends.
///
/// All implementations must be safe for concurrent use; the monitor actors
/// and the reconciler share one instance behind an `Arc`.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Device inventory ===

    /// Insert or update a device, keyed on its local id when present.
    /// Returns the stored record with the local id filled in.
    async fn upsert_device(&self, device: DeviceRecord) -> StorageResult<DeviceRecord>;

    /// Look up a device by its ACS identity.
    async fn find_device_by_remote_id(&self, remote_id: &str)
        -> StorageResult<Option<DeviceRecord>>;

    /// Look up a device that predates its remote id, by class and fallback
    /// key (name for OLTs, serial number otherwise).
    async fn find_device_by_fallback_key(
        &self,
        class: DeviceClass,
        key: &str,
    ) -> StorageResult<Option<DeviceRecord>>;

    /// All known devices.
    async fn list_devices(&self) -> StorageResult<Vec<DeviceRecord>>;

    // === Parameter samples ===

    /// Append a batch of samples. Duplicates on (device, parameter,
    /// timestamp) are silently skipped, so replayed ticks are harmless.
    async fn insert_samples_batch(&self, samples: Vec<SampleRow>) -> StorageResult<usize>;

    /// Samples for one device within a time range, newest first.
    async fn query_samples_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>>;

    // === Threshold rules ===

    async fn create_threshold(&self, rule: NewThresholdRule) -> StorageResult<ThresholdRule>;

    /// All rules with `enabled` set, in insertion order.
    async fn list_enabled_thresholds(&self) -> StorageResult<Vec<ThresholdRule>>;

    // === Alerts ===

    /// The currently active alert with this exact title for this device, if
    /// any. Used for dedup before raising a new one.
    async fn find_active_alert(&self, device_id: &str, title: &str)
        -> StorageResult<Option<Alert>>;

    async fn create_alert(&self, alert: NewAlert) -> StorageResult<Alert>;

    /// All alerts for one device, newest first.
    async fn list_alerts(&self, device_id: &str) -> StorageResult<Vec<Alert>>;

    // === Health snapshots ===

    /// Replace the stored snapshot for the device.
    async fn upsert_health_snapshot(&self, snapshot: HealthSnapshot) -> StorageResult<()>;

    async fn get_health_snapshot(&self, device_id: &str) -> StorageResult<Option<HealthSnapshot>>;

    /// Most recently calculated snapshots across all devices.
    async fn latest_health_snapshots(&self, limit: usize) -> StorageResult<Vec<HealthSnapshot>>;

    // === Monitoring configs ===

    async fn upsert_config(&self, config: MonitoringConfig) -> StorageResult<()>;

    async fn get_config(&self, id: &str) -> StorageResult<Option<MonitoringConfig>>;

    /// Record the completion time of a sync pass for this config.
    async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> StorageResult<()>;

    // === Lifecycle ===

    /// Check if the backend is reachable and working.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Backend statistics for logging and diagnostics.
    async fn get_stats(&self) -> StorageResult<String>;

    /// Flush and release resources. Further calls after close are undefined.
    async fn close(&self) -> StorageResult<()>;
}
