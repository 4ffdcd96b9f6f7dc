//! Device classification heuristic
//!
//! The management protocol carries no hard signal for whether a device is an
//! aggregation node (OLT) or a subscriber endpoint (ONU), so classification is
//! a best-effort string match over the metadata the ACS reports.
//!
//! ## Precedence
//!
//! 1. No manufacturer and no model → `Unknown`
//! 2. Manufacturer contains a known OLT vendor substring → `Olt`
//! 3. Model contains "olt" → `Olt`
//! 4. Otherwise → `Onu`

use crate::DeviceClass;

/// Vendors whose devices in these deployments are aggregation nodes.
const OLT_VENDORS: &[&str] = &["huawei", "zte", "nokia"];

/// Classify a device from its reported manufacturer and model strings.
///
/// All matching is case-insensitive.
pub fn classify_device(manufacturer: Option<&str>, model: Option<&str>) -> DeviceClass {
    let manufacturer = manufacturer.unwrap_or("").trim().to_lowercase();
    let model = model.unwrap_or("").trim().to_lowercase();

    if manufacturer.is_empty() && model.is_empty() {
        return DeviceClass::Unknown;
    }

    if OLT_VENDORS.iter().any(|vendor| manufacturer.contains(vendor)) {
        return DeviceClass::Olt;
    }

    if model.contains("olt") {
        return DeviceClass::Olt;
    }

    DeviceClass::Onu
}
