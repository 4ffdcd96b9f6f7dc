//! Wire types for the ACS northbound interface

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

/// A device last informing within this window counts as online.
pub const ONLINE_WINDOW_MINUTES: i64 = 5;

/// A device summary as reported by the ACS device listing.
///
/// Most fields are optional; freshly provisioned devices often report only an
/// id until their first full inform.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDevice {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_serialNumber", default)]
    pub serial_number: Option<String>,

    #[serde(rename = "_manufacturer", default)]
    pub manufacturer: Option<String>,

    #[serde(rename = "_productId", default)]
    pub product_id: Option<String>,

    #[serde(rename = "_oui", default)]
    pub oui: Option<String>,

    #[serde(rename = "_lastInform", default)]
    pub last_inform: Option<DateTime<Utc>>,

    #[serde(rename = "_registered", default)]
    pub registered: Option<DateTime<Utc>>,

    #[serde(rename = "_softwareVersion", default)]
    pub software_version: Option<String>,

    #[serde(rename = "_hardwareVersion", default)]
    pub hardware_version: Option<String>,

    #[serde(rename = "_tags", default)]
    pub tags: Vec<String>,
}

impl RemoteDevice {
    /// Whether the device informed within the online window.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.last_inform
            .map(|at| now - at < Duration::minutes(ONLINE_WINDOW_MINUTES))
            .unwrap_or(false)
    }

    /// Minutes since the last inform; `None` if the device never informed.
    pub fn minutes_since_last_inform(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_inform
            .map(|at| (now - at).num_seconds() as f64 / 60.0)
    }
}

/// A single readable/writable device attribute.
#[derive(Debug, Clone, Deserialize)]
pub struct AcsParameter {
    pub path: String,

    /// Absent when the device has no value for this parameter
    #[serde(default)]
    pub value: Option<Value>,

    #[serde(rename = "type", default)]
    pub value_type: Option<String>,

    #[serde(default)]
    pub writable: Option<bool>,

    #[serde(default)]
    pub notification: Option<i64>,
}

/// A remote task created on the ACS.
#[derive(Debug, Clone, Deserialize)]
pub struct AcsTask {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    #[serde(default)]
    pub status: Option<String>,
}
