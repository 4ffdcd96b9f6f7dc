//! Device reconciliation between the ACS and the local inventory
//!
//! One sync pass lists every device the ACS knows, classifies it, merges it
//! into the local inventory and derives its online status from the inform
//! recency window. Faults are isolated per device: a device that cannot be
//! processed lands in the report's error list and the pass continues.
//!
//! Locally curated fields (display name, network address) are preserved once
//! set; the ACS only ever fills gaps.

use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::acs::{AcsClient, RemoteDevice};
use crate::classify::classify_device;
use crate::config::MonitoringConfig;
use crate::events::{EventBroadcaster, MonitoringEvent, MONITORING_TOPIC};
use crate::params::numeric_value;
use crate::storage::{DeviceRecord, Storage};
use crate::{DeviceClass, DeviceStatus};

static CONNECTION_REQUEST_HOST: LazyLock<Regex> = LazyLock::new(|| {
    // the pattern is a literal, this cannot fail
    Regex::new(r"http://([0-9.]+):").unwrap()
});

const OLT_ENRICHMENT_PARAMETERS: &[&str] = &[
    "InternetGatewayDevice.ManagementServer.ConnectionRequestURL",
    "InternetGatewayDevice.LANDevice.1.Hosts.HostNumberOfEntries",
];

const ONU_ENRICHMENT_PARAMETERS: &[&str] = &[
    "InternetGatewayDevice.WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_MgtDevIp",
];

/// Restrict a sync pass to one device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTypeFilter {
    All,
    Olt,
    Onu,
}

impl DeviceTypeFilter {
    fn includes(self, class: DeviceClass) -> bool {
        match self {
            DeviceTypeFilter::All => true,
            DeviceTypeFilter::Olt => class == DeviceClass::Olt,
            DeviceTypeFilter::Onu => class != DeviceClass::Olt,
        }
    }
}

/// One device that failed to sync.
#[derive(Debug, Clone)]
pub struct SyncError {
    pub device_id: String,
    pub message: String,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Devices merged into the inventory
    pub synced: usize,

    /// Devices the ACS listed
    pub total: usize,

    pub errors: Vec<SyncError>,
}

/// Merges the ACS device listing into the local inventory.
pub struct DeviceReconciler {
    client: Arc<AcsClient>,
    storage: Arc<dyn Storage>,
    broadcaster: Arc<EventBroadcaster>,
}

impl DeviceReconciler {
    pub fn new(
        client: Arc<AcsClient>,
        storage: Arc<dyn Storage>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            client,
            storage,
            broadcaster,
        }
    }

    /// Run one sync pass.
    ///
    /// Fails fast on an invalid config or an unreachable ACS; per-device
    /// failures are collected in the report instead. The sync timestamp is
    /// recorded even for a pass with errors.
    #[instrument(skip(self, config), fields(config_id = %config.id))]
    pub async fn sync(
        &self,
        config: &MonitoringConfig,
        filter: DeviceTypeFilter,
    ) -> anyhow::Result<SyncReport> {
        config.validate()?;

        let devices = self
            .client
            .list_devices(None)
            .await
            .context("listing devices from ACS")?;

        let mut report = SyncReport {
            total: devices.len(),
            ..Default::default()
        };

        for device in &devices {
            match self.sync_device(device, filter).await {
                Ok(true) => report.synced += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("failed to sync device {}: {e:#}", device.id);
                    report.errors.push(SyncError {
                        device_id: device.id.clone(),
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        // the pass ran; partial failure must not stall sync scheduling
        if let Err(e) = self.storage.touch_last_sync(&config.id, Utc::now()).await {
            warn!("failed to record sync time for {}: {e}", config.id);
        }

        info!(
            "sync complete: {}/{} devices, {} errors",
            report.synced,
            report.total,
            report.errors.len()
        );
        Ok(report)
    }

    /// Merge one remote device. `Ok(false)` means it was filtered out.
    async fn sync_device(
        &self,
        remote: &RemoteDevice,
        filter: DeviceTypeFilter,
    ) -> anyhow::Result<bool> {
        let serial = remote
            .serial_number
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("device reports no serial number"))?;

        let class = classify_device(remote.manufacturer.as_deref(), remote.product_id.as_deref());
        if !filter.includes(class) {
            return Ok(false);
        }

        let status = if remote.is_online(Utc::now()) {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        };

        let existing = match self.storage.find_device_by_remote_id(&remote.id).await? {
            Some(device) => Some(device),
            None => {
                let key = fallback_key(class, serial);
                self.storage.find_device_by_fallback_key(class, &key).await?
            }
        };

        let previous_status = existing.as_ref().map(|device| device.status);

        let mut record = match existing {
            Some(mut device) => {
                device.remote_id = Some(remote.id.clone());
                device.status = status;
                device.last_seen = remote.last_inform;
                device.manufacturer = remote
                    .manufacturer
                    .clone()
                    .or(device.manufacturer);
                device.model = remote.product_id.clone().or(device.model);
                device
            }
            None => DeviceRecord {
                id: None,
                remote_id: Some(remote.id.clone()),
                class,
                name: fallback_key(class, serial),
                serial_number: serial.to_string(),
                manufacturer: remote.manufacturer.clone(),
                model: remote.product_id.clone(),
                ip_address: None,
                status,
                last_seen: remote.last_inform,
                parent_id: None,
                subordinate_count: None,
            },
        };

        // Best effort only; an enrichment failure never fails the device
        if let Err(e) = self.enrich(&mut record, &remote.id, class).await {
            warn!("enrichment failed for {}: {e}", remote.id);
        }

        let stored = self.storage.upsert_device(record).await?;

        if previous_status != Some(status) {
            debug!(
                "device {} status: {:?} -> {status}",
                remote.id, previous_status
            );
            self.broadcaster.publish(
                MONITORING_TOPIC,
                MonitoringEvent::DeviceStatusChanged {
                    device_id: remote.id.clone(),
                    device_type: stored.class,
                    status: status.to_string(),
                    timestamp: Utc::now(),
                },
            );
        }

        Ok(true)
    }

    /// Fill network details from device parameters. Existing local values win.
    async fn enrich(
        &self,
        record: &mut DeviceRecord,
        remote_id: &str,
        class: DeviceClass,
    ) -> anyhow::Result<()> {
        let paths = match class {
            DeviceClass::Olt => OLT_ENRICHMENT_PARAMETERS,
            DeviceClass::Onu | DeviceClass::Unknown => ONU_ENRICHMENT_PARAMETERS,
        };

        let parameters = self.client.get_parameters(remote_id, paths).await?;

        for parameter in &parameters {
            let Some(value) = &parameter.value else {
                continue;
            };

            if parameter.path.contains("ConnectionRequestURL") {
                if record.ip_address.is_none() {
                    record.ip_address = value
                        .as_str()
                        .and_then(|url| CONNECTION_REQUEST_HOST.captures(url))
                        .map(|captures| captures[1].to_string());
                }
            } else if parameter.path.contains("HostNumberOfEntries") {
                record.subordinate_count = numeric_value(value).map(|n| n as i64);
            } else if parameter.path.contains("ExternalIPAddress")
                || parameter.path.contains("MgtDevIp")
            {
                if record.ip_address.is_none() {
                    record.ip_address = value
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .map(str::to_string);
                }
            }
        }

        Ok(())
    }
}

fn fallback_key(class: DeviceClass, serial: &str) -> String {
    match class {
        DeviceClass::Olt => format!("OLT-{serial}"),
        DeviceClass::Onu | DeviceClass::Unknown => serial.to_string(),
    }
}
