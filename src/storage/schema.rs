//! Persisted record definitions
//!
//! ## Identity model
//!
//! Devices carry two identities: the local inventory id (assigned by the
//! store) and the remote ACS id (assigned by the management server, nullable
//! until first sync). The monitoring pipeline keys everything on the remote id
//! because that is what the ACS speaks; the reconciler maps between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DeviceClass, DeviceParameter, DeviceStatus, Severity};

/// A device in the local inventory.
///
/// Created by the reconciler on first sight, updated on every sync. Never
/// deleted by the engine; removal is an explicit operator action elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Local identity; `None` until the store assigns one
    pub id: Option<i64>,

    /// ACS identity; `None` until synced
    pub remote_id: Option<String>,

    pub class: DeviceClass,

    /// Display name; preserved once set locally
    pub name: String,

    pub serial_number: String,

    pub manufacturer: Option<String>,

    pub model: Option<String>,

    /// Network address; preserved once set locally
    pub ip_address: Option<String>,

    pub status: DeviceStatus,

    pub last_seen: Option<DateTime<Utc>>,

    /// Owning OLT for ONU endpoints
    pub parent_id: Option<i64>,

    /// Attached endpoint count for OLTs
    pub subordinate_count: Option<i64>,
}

impl DeviceRecord {
    /// The identity used to find a device that was created before its remote
    /// id was known: the constructed display name for OLTs, the serial number
    /// for everything else.
    pub fn fallback_key(&self) -> &str {
        match self.class {
            DeviceClass::Olt => &self.name,
            DeviceClass::Onu | DeviceClass::Unknown => &self.serial_number,
        }
    }
}

/// One parameter sample, append-only, one row per (device, parameter, tick).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// ACS identity of the device
    pub device_id: String,

    pub parameter_path: String,

    pub value: Value,

    pub unit: String,

    pub timestamp: DateTime<Utc>,
}

impl SampleRow {
    pub fn from_parameter(parameter: &DeviceParameter) -> Self {
        Self {
            device_id: parameter.device_id.clone(),
            parameter_path: parameter.path.clone(),
            value: parameter.value.clone(),
            unit: parameter.unit.clone(),
            timestamp: parameter.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// An alert raised by the threshold engine, not yet stored.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub device_id: String,
    pub device_class: DeviceClass,
}

/// A stored alert.
///
/// Invariant: at most one active alert per (device, title) pair. The engine
/// only ever creates alerts; resolution is an external operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub device_id: String,
    pub device_class: DeviceClass,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

/// Explanatory breakdown behind a health score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthFactors {
    /// Uptime percentage over the trailing week
    pub uptime: f64,

    /// Average response time in milliseconds
    pub response_time: f64,

    /// Error rate percentage
    pub error_rate: f64,

    /// Mirrors the performance sub-score
    pub parameter_health: f64,
}

/// Latest-known composite health for one device. Replaced on every
/// recomputation, never appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// ACS identity of the device
    pub device_id: String,

    /// 0-100 composite
    pub overall: u8,

    pub connectivity: u8,

    pub performance: u8,

    pub stability: u8,

    pub factors: HealthFactors,

    pub calculated_at: DateTime<Utc>,
}
