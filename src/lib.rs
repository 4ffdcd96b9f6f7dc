pub mod acs;
pub mod cache;
pub mod classify;
pub mod config;
pub mod events;
pub mod health;
pub mod monitor;
pub mod params;
pub mod storage;
pub mod sync;
pub mod thresholds;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device class within the fiber access hierarchy.
///
/// Classification is a heuristic over manufacturer/model strings (see
/// [`classify::classify_device`]) since the management protocol carries no
/// hard signal for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Aggregation node terminating many subordinate endpoints
    Olt,

    /// Subscriber-side endpoint attached to an OLT
    Onu,

    /// Could not be classified from the available metadata
    Unknown,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Olt => write!(f, "olt"),
            DeviceClass::Onu => write!(f, "onu"),
            DeviceClass::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Warning => write!(f, "warning"),
        }
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single parameter reading for a device, as cached per poll tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceParameter {
    /// ACS identity of the device this reading belongs to
    pub device_id: String,

    /// Dotted hierarchical parameter path
    pub path: String,

    /// Raw value as reported by the ACS
    pub value: serde_json::Value,

    /// Unit derived from the parameter path (may be empty)
    pub unit: String,

    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}
