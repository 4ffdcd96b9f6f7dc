//! Critical parameter sets and path heuristics
//!
//! Each device class has a fixed list of parameters worth polling every tick.
//! The lists follow the TR-098 `InternetGatewayDevice` tree plus the
//! vendor-specific `X_CT-COM` extensions common on ONU endpoints.

use crate::DeviceClass;

/// Parameters polled every tick for OLT-class devices.
const OLT_CRITICAL_PARAMETERS: &[&str] = &[
    "InternetGatewayDevice.DeviceInfo.HardwareVersion",
    "InternetGatewayDevice.DeviceInfo.SoftwareVersion",
    "InternetGatewayDevice.DeviceInfo.UpTime",
    "InternetGatewayDevice.DeviceInfo.ProcessorStatus",
    "InternetGatewayDevice.DeviceInfo.MemoryStatus.Total",
    "InternetGatewayDevice.DeviceInfo.MemoryStatus.Free",
    "InternetGatewayDevice.DeviceInfo.Temperature.Status",
    "InternetGatewayDevice.DeviceInfo.Temperature.Value",
    "InternetGatewayDevice.LANDevice.1.Hosts.HostNumberOfEntries",
    "InternetGatewayDevice.WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress",
    "InternetGatewayDevice.ManagementServer.ConnectionRequestURL",
    "InternetGatewayDevice.Layer2Bridging.BridgeNumberOfEntries",
    "InternetGatewayDevice.QueueManagement.NumberOfQueues",
];

/// Parameters polled every tick for ONU-class devices.
const ONU_CRITICAL_PARAMETERS: &[&str] = &[
    "InternetGatewayDevice.DeviceInfo.HardwareVersion",
    "InternetGatewayDevice.DeviceInfo.SoftwareVersion",
    "InternetGatewayDevice.DeviceInfo.UpTime",
    "InternetGatewayDevice.WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress",
    "InternetGatewayDevice.LANDevice.1.LANHostConfigManagement.IPInterface.1.IPInterfaceIPAddress",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_MgtDevIp",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_UplinkRate",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_DownlinkRate",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_OpticalSignal",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_Temperature",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_Voltage",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_BiasCurrent",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_TransmitPower",
    "InternetGatewayDevice.DeviceInfo.X_CT-COM_ReceivePower",
];

/// The critical parameter set for a device class.
///
/// Unclassified devices get the ONU set, which is the larger population by far
/// in any fiber deployment.
pub fn critical_parameters(class: DeviceClass) -> &'static [&'static str] {
    match class {
        DeviceClass::Olt => OLT_CRITICAL_PARAMETERS,
        DeviceClass::Onu | DeviceClass::Unknown => ONU_CRITICAL_PARAMETERS,
    }
}

/// Derive a display unit from a parameter path.
///
/// Substring match with fixed precedence; unmatched paths get an empty unit.
pub fn unit_for_path(path: &str) -> &'static str {
    if path.contains("Temperature") {
        return "°C";
    }
    if path.contains("Voltage") {
        return "V";
    }
    if path.contains("Power") {
        return "dBm";
    }
    if path.contains("Rate") || path.contains("Speed") {
        return "Mbps";
    }
    if path.contains("Memory") {
        return "MB";
    }
    if path.contains("Time") || path.contains("UpTime") {
        return "seconds";
    }
    ""
}

/// Interpret a reported parameter value as a number where possible.
///
/// The ACS reports values with inconsistent typing (numbers arrive as JSON
/// numbers or as strings depending on the device), so numeric interpretation
/// has to try both.
pub fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
