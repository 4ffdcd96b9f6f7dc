//! Threshold rules and their evaluation against cached snapshots
//!
//! Rules live in storage; the engine evaluates the latest cached snapshot of
//! a device against every enabled rule whose scope matches the device class.
//! A firing rule raises at most one active alert per (device, parameter):
//! while that alert stays active, subsequent breaches are suppressed.
//!
//! Numeric comparisons never coerce strings and vice versa. A rule whose
//! value kind does not match the sampled value simply does not fire.

use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::cache::ParameterCache;
use crate::events::{EventBroadcaster, MonitoringEvent, MONITORING_TOPIC};
use crate::params::numeric_value;
use crate::storage::{NewAlert, Storage};
use crate::{DeviceClass, DeviceParameter, Severity};

/// Comparison operator of a threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Numeric only, never lexicographic
    GreaterThan,

    /// Numeric only, never lexicographic
    LessThan,

    /// Numeric or exact text match
    Equals,

    /// Numeric or exact text mismatch
    NotEquals,

    /// Substring, text only
    Contains,
}

impl Condition {
    fn matches_numeric(self, sampled: f64, threshold: f64) -> bool {
        match self {
            Condition::GreaterThan => sampled > threshold,
            Condition::LessThan => sampled < threshold,
            Condition::Equals => sampled == threshold,
            Condition::NotEquals => sampled != threshold,
            Condition::Contains => false,
        }
    }

    fn matches_text(self, sampled: &str, threshold: &str) -> bool {
        match self {
            Condition::Equals => sampled == threshold,
            Condition::NotEquals => sampled != threshold,
            Condition::Contains => sampled.contains(threshold),
            Condition::GreaterThan | Condition::LessThan => false,
        }
    }
}

/// The comparison value of a rule, numeric or textual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for ThresholdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdValue::Number(n) => write!(f, "{}", n),
            ThresholdValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Which device classes a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdScope {
    All,
    Olt,
    Onu,
}

impl ThresholdScope {
    /// Unknown devices only match `All`; a class-scoped rule never fires for
    /// a device we could not classify.
    pub fn applies_to(self, class: DeviceClass) -> bool {
        match self {
            ThresholdScope::All => true,
            ThresholdScope::Olt => class == DeviceClass::Olt,
            ThresholdScope::Onu => class == DeviceClass::Onu,
        }
    }
}

/// A threshold rule not yet stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewThresholdRule {
    pub parameter_path: String,
    pub scope: ThresholdScope,
    pub condition: Condition,
    pub threshold_value: ThresholdValue,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// A stored threshold rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub id: i64,
    pub parameter_path: String,
    pub scope: ThresholdScope,
    pub condition: Condition,
    pub threshold_value: ThresholdValue,
    pub severity: Severity,
    pub enabled: bool,
    pub description: Option<String>,
}

impl ThresholdRule {
    /// Whether this rule fires for the given sampled value.
    ///
    /// Comparison is numeric when both sides interpret as f64 (devices report
    /// numbers as strings inconsistently), falling back to text comparison
    /// otherwise. A kind mismatch that survives both interpretations never
    /// fires.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        let threshold_numeric = match &self.threshold_value {
            ThresholdValue::Number(n) => Some(*n),
            ThresholdValue::Text(s) => s.trim().parse::<f64>().ok(),
        };

        if let (Some(sampled), Some(threshold)) = (numeric_value(value), threshold_numeric) {
            return self.condition.matches_numeric(sampled, threshold);
        }

        match (value.as_str(), &self.threshold_value) {
            (Some(sampled), ThresholdValue::Text(threshold)) => {
                self.condition.matches_text(sampled, threshold)
            }
            _ => false,
        }
    }
}

/// The alert title used for dedup, derived from the parameter path alone.
/// One active alert per (device, path) regardless of which rule fired.
pub fn alert_title(parameter_path: &str) -> String {
    format!("Parameter Threshold: {parameter_path}")
}

/// Evaluates enabled threshold rules against cached device snapshots.
#[derive(Clone)]
pub struct ThresholdEngine {
    storage: Arc<dyn Storage>,
    cache: Arc<ParameterCache>,
    broadcaster: Arc<EventBroadcaster>,
}

impl ThresholdEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<ParameterCache>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            storage,
            cache,
            broadcaster,
        }
    }

    /// Evaluate all enabled rules against the device's latest snapshot.
    ///
    /// Returns the number of alerts created. A device without a cached
    /// snapshot evaluates to zero; an already-active alert suppresses
    /// re-raising.
    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn evaluate_device(
        &self,
        device_id: &str,
        class: DeviceClass,
    ) -> anyhow::Result<usize> {
        let Some(snapshot) = self.cache.snapshot(device_id) else {
            debug!("no cached snapshot, skipping threshold evaluation");
            return Ok(0);
        };

        let rules = self
            .storage
            .list_enabled_thresholds()
            .await
            .context("loading threshold rules")?;

        let mut created = 0;
        for rule in rules.iter().filter(|rule| rule.scope.applies_to(class)) {
            let Some(parameter) = snapshot
                .iter()
                .find(|parameter| parameter.path == rule.parameter_path)
            else {
                continue;
            };

            if !rule.matches(&parameter.value) {
                continue;
            }

            if self.raise_alert(device_id, class, rule, parameter).await? {
                created += 1;
            }
        }

        Ok(created)
    }

    /// Store and publish an alert for a fired rule, unless one with the same
    /// title is already active for the device. Returns whether an alert was
    /// actually created.
    async fn raise_alert(
        &self,
        device_id: &str,
        class: DeviceClass,
        rule: &ThresholdRule,
        parameter: &DeviceParameter,
    ) -> anyhow::Result<bool> {
        let title = alert_title(&rule.parameter_path);

        if self
            .storage
            .find_active_alert(device_id, &title)
            .await
            .context("checking for active alert")?
            .is_some()
        {
            debug!(path = %rule.parameter_path, "alert already active, suppressing");
            return Ok(false);
        }

        let current = parameter_display(&parameter.value);
        let mut description = format!(
            "{path} is {current}{unit}, breaching {condition:?} {threshold}{unit}",
            path = rule.parameter_path,
            unit = parameter.unit,
            condition = rule.condition,
            threshold = rule.threshold_value,
        );
        if let Some(note) = rule.description.as_deref().filter(|note| !note.is_empty()) {
            description = format!("{note}. {description}");
        }

        let alert = self
            .storage
            .create_alert(NewAlert {
                severity: rule.severity,
                title,
                description,
                device_id: device_id.to_string(),
                device_class: class,
            })
            .await
            .context("storing alert")?;

        warn!(
            path = %rule.parameter_path,
            severity = %alert.severity,
            "threshold breached, alert {} created",
            alert.id
        );

        self.broadcaster.publish(
            MONITORING_TOPIC,
            MonitoringEvent::AlertCreated {
                device_id: device_id.to_string(),
                device_type: class,
                severity: alert.severity,
                title: alert.title.clone(),
                timestamp: Utc::now(),
            },
        );

        Ok(true)
    }
}

fn parameter_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
