//! In-memory storage backend
//!
//! Fully functional but non-persistent. Used in tests and in deployments
//! that run without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::MonitoringConfig;
use crate::storage::backend::{HealthStatus, Storage};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{
    Alert, AlertStatus, DeviceRecord, HealthSnapshot, NewAlert, SampleRow,
};
use crate::thresholds::{NewThresholdRule, ThresholdRule};
use crate::DeviceClass;

#[derive(Debug, Default)]
struct Inner {
    devices: Vec<DeviceRecord>,
    next_device_id: i64,
    samples: Vec<SampleRow>,
    thresholds: Vec<ThresholdRule>,
    next_threshold_id: i64,
    alerts: Vec<Alert>,
    next_alert_id: i64,
    health: HashMap<String, HealthSnapshot>,
    configs: HashMap<String, MonitoringConfig>,
}

/// Non-persistent [`Storage`] implementation backed by a single `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_device(&self, mut device: DeviceRecord) -> StorageResult<DeviceRecord> {
        let mut inner = self.inner.write().await;

        match device.id {
            Some(id) => {
                let existing = inner
                    .devices
                    .iter_mut()
                    .find(|candidate| candidate.id == Some(id))
                    .ok_or_else(|| {
                        StorageError::QueryFailed(format!("no device with id {id}"))
                    })?;
                *existing = device.clone();
                Ok(device)
            }
            None => {
                inner.next_device_id += 1;
                device.id = Some(inner.next_device_id);
                inner.devices.push(device.clone());
                Ok(device)
            }
        }
    }

    async fn find_device_by_remote_id(
        &self,
        remote_id: &str,
    ) -> StorageResult<Option<DeviceRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .devices
            .iter()
            .find(|device| device.remote_id.as_deref() == Some(remote_id))
            .cloned())
    }

    async fn find_device_by_fallback_key(
        &self,
        class: DeviceClass,
        key: &str,
    ) -> StorageResult<Option<DeviceRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .devices
            .iter()
            .find(|device| device.class == class && device.fallback_key() == key)
            .cloned())
    }

    async fn list_devices(&self) -> StorageResult<Vec<DeviceRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.devices.clone())
    }

    async fn insert_samples_batch(&self, samples: Vec<SampleRow>) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let mut inserted = 0;

        for sample in samples {
            let duplicate = inner.samples.iter().any(|existing| {
                existing.device_id == sample.device_id
                    && existing.parameter_path == sample.parameter_path
                    && existing.timestamp == sample.timestamp
            });
            if !duplicate {
                inner.samples.push(sample);
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn query_samples_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<SampleRow> = inner
            .samples
            .iter()
            .filter(|sample| {
                sample.device_id == device_id
                    && sample.timestamp >= start
                    && sample.timestamp <= end
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn create_threshold(&self, rule: NewThresholdRule) -> StorageResult<ThresholdRule> {
        let mut inner = self.inner.write().await;
        inner.next_threshold_id += 1;
        let stored = ThresholdRule {
            id: inner.next_threshold_id,
            parameter_path: rule.parameter_path,
            scope: rule.scope,
            condition: rule.condition,
            threshold_value: rule.threshold_value,
            severity: rule.severity,
            enabled: rule.enabled,
            description: rule.description,
        };
        inner.thresholds.push(stored.clone());
        Ok(stored)
    }

    async fn list_enabled_thresholds(&self) -> StorageResult<Vec<ThresholdRule>> {
        let inner = self.inner.read().await;
        Ok(inner
            .thresholds
            .iter()
            .filter(|rule| rule.enabled)
            .cloned()
            .collect())
    }

    async fn find_active_alert(
        &self,
        device_id: &str,
        title: &str,
    ) -> StorageResult<Option<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .iter()
            .find(|alert| {
                alert.device_id == device_id
                    && alert.title == title
                    && alert.status == AlertStatus::Active
            })
            .cloned())
    }

    async fn create_alert(&self, alert: NewAlert) -> StorageResult<Alert> {
        let mut inner = self.inner.write().await;
        inner.next_alert_id += 1;
        let stored = Alert {
            id: inner.next_alert_id,
            severity: alert.severity,
            title: alert.title,
            description: alert.description,
            device_id: alert.device_id,
            device_class: alert.device_class,
            status: AlertStatus::Active,
            created_at: Utc::now(),
        };
        inner.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn list_alerts(&self, device_id: &str) -> StorageResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .iter()
            .filter(|alert| alert.device_id == device_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn upsert_health_snapshot(&self, snapshot: HealthSnapshot) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.health.insert(snapshot.device_id.clone(), snapshot);
        Ok(())
    }

    async fn get_health_snapshot(&self, device_id: &str) -> StorageResult<Option<HealthSnapshot>> {
        let inner = self.inner.read().await;
        Ok(inner.health.get(device_id).cloned())
    }

    async fn latest_health_snapshots(&self, limit: usize) -> StorageResult<Vec<HealthSnapshot>> {
        let inner = self.inner.read().await;
        let mut snapshots: Vec<HealthSnapshot> = inner.health.values().cloned().collect();
        snapshots.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        snapshots.truncate(limit);
        Ok(snapshots)
    }

    async fn upsert_config(&self, config: MonitoringConfig) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.configs.insert(config.id.clone(), config);
        Ok(())
    }

    async fn get_config(&self, id: &str) -> StorageResult<Option<MonitoringConfig>> {
        let inner = self.inner.read().await;
        Ok(inner.configs.get(id).cloned())
    }

    async fn touch_last_sync(&self, config_id: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(config) = inner.configs.get_mut(config_id) {
            config.last_sync = Some(at);
        }
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        Ok(HealthStatus::healthy("memory backend operational")
            .with_metadata("devices", inner.devices.len().to_string())
            .with_metadata("samples", inner.samples.len().to_string()))
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let inner = self.inner.read().await;
        Ok(format!(
            "memory: {} devices, {} samples, {} alerts, {} health snapshots",
            inner.devices.len(),
            inner.samples.len(),
            inner.alerts.len(),
            inner.health.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
