//! Composite device health scoring
//!
//! A device's health is a weighted blend of three sub-scores, each 0-100:
//!
//! - **connectivity** (30%): how recently the device informed the ACS
//! - **performance** (40%): banded scoring of the cached parameter snapshot
//! - **stability** (30%): uptime, error rate and reading consistency
//!
//! Scoring never fails: if the ACS cannot be reached the device scores zero
//! with a 100% error rate, which is itself useful signal. Persistence of the
//! snapshot is best-effort; a storage failure is logged and the computed
//! score still returned.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::acs::AcsClient;
use crate::cache::ParameterCache;
use crate::params::numeric_value;
use crate::storage::{HealthFactors, HealthSnapshot, Storage};
use crate::DeviceParameter;

const WEIGHT_CONNECTIVITY: f64 = 0.3;
const WEIGHT_PERFORMANCE: f64 = 0.4;
const WEIGHT_STABILITY: f64 = 0.3;

const SECONDS_PER_WEEK: f64 = 7.0 * 24.0 * 3600.0;

/// Step function over minutes since the last inform.
pub fn connectivity_score(minutes_since_inform: f64) -> u8 {
    if minutes_since_inform < 5.0 {
        100
    } else if minutes_since_inform < 15.0 {
        80
    } else if minutes_since_inform < 60.0 {
        60
    } else if minutes_since_inform < 1440.0 {
        40
    } else {
        20
    }
}

/// Banded scoring over the parameters of a snapshot.
///
/// Every parameter starts at 100 and is degraded when its path matches one
/// of the known hot paths; the sub-score is the average over the whole
/// snapshot, so one bad reading dilutes instead of dominating. A snapshot
/// with no parameters is healthy by definition.
pub fn performance_score(parameters: &[DeviceParameter]) -> u8 {
    if parameters.is_empty() {
        return 100;
    }

    let total: f64 = parameters.iter().map(parameter_band_score).sum();
    (total / parameters.len() as f64).round() as u8
}

fn parameter_band_score(parameter: &DeviceParameter) -> f64 {
    let Some(value) = numeric_value(&parameter.value) else {
        return 100.0;
    };

    let path = parameter.path.as_str();

    if path.contains("Processor") && path.contains("Load") {
        if value > 90.0 {
            20.0
        } else if value > 70.0 {
            50.0
        } else if value > 50.0 {
            80.0
        } else {
            100.0
        }
    } else if path.contains("Memory") && path.contains("Free") {
        if value < 10.0 {
            30.0
        } else if value < 50.0 {
            60.0
        } else {
            100.0
        }
    } else if path.contains("Temperature") {
        if value > 80.0 {
            10.0
        } else if value > 70.0 {
            40.0
        } else if value > 60.0 {
            70.0
        } else {
            100.0
        }
    } else if path.contains("OpticalSignal") || path.contains("ReceivePower") {
        if value < -30.0 {
            20.0
        } else if value < -25.0 {
            50.0
        } else if value < -20.0 {
            80.0
        } else {
            100.0
        }
    } else {
        100.0
    }
}

/// Source of the stability inputs the ACS does not report directly.
///
/// The default implementation carries fleet-wide baseline estimates; a
/// deployment with real telemetry for these can inject its own.
pub trait StabilityInputs: Send + Sync {
    /// Uptime percentage, 0-100
    fn uptime_score(&self) -> f64;

    /// Error rate percentage, 0-100
    fn error_rate(&self) -> f64;

    /// Reading consistency percentage, 0-100
    fn consistency_score(&self) -> f64;

    /// Average ACS round trip in milliseconds
    fn response_time_ms(&self) -> f64;
}

/// Fleet-wide baseline estimates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineStability;

impl StabilityInputs for BaselineStability {
    fn uptime_score(&self) -> f64 {
        85.0
    }

    fn error_rate(&self) -> f64 {
        5.0
    }

    fn consistency_score(&self) -> f64 {
        90.0
    }

    fn response_time_ms(&self) -> f64 {
        150.0
    }
}

fn stability_score(inputs: &dyn StabilityInputs) -> u8 {
    let error_score = (100.0 - inputs.error_rate()).clamp(0.0, 100.0);
    ((inputs.uptime_score() + error_score + inputs.consistency_score()) / 3.0).round() as u8
}

/// Computes and persists composite health snapshots.
pub struct HealthScorer {
    client: Arc<AcsClient>,
    cache: Arc<ParameterCache>,
    storage: Arc<dyn Storage>,
    stability: Arc<dyn StabilityInputs>,
}

impl HealthScorer {
    pub fn new(
        client: Arc<AcsClient>,
        cache: Arc<ParameterCache>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self::with_stability(client, cache, storage, Arc::new(BaselineStability))
    }

    pub fn with_stability(
        client: Arc<AcsClient>,
        cache: Arc<ParameterCache>,
        storage: Arc<dyn Storage>,
        stability: Arc<dyn StabilityInputs>,
    ) -> Self {
        Self {
            client,
            cache,
            storage,
            stability,
        }
    }

    /// Compute the current health snapshot for a device.
    ///
    /// Never errors. An unreachable device scores zero across the board with
    /// a 100% error rate in the factors.
    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn calculate_health(&self, device_id: &str) -> HealthSnapshot {
        let snapshot = match self.client.get_device(device_id).await {
            Ok(device) => {
                let minutes = device
                    .minutes_since_last_inform(Utc::now())
                    .unwrap_or(f64::MAX);
                let connectivity = connectivity_score(minutes);

                let parameters = self.cache.snapshot(device_id).unwrap_or_default();
                let performance = performance_score(&parameters);
                let stability = stability_score(self.stability.as_ref());

                let overall = (WEIGHT_CONNECTIVITY * connectivity as f64
                    + WEIGHT_PERFORMANCE * performance as f64
                    + WEIGHT_STABILITY * stability as f64)
                    .round() as u8;

                HealthSnapshot {
                    device_id: device_id.to_string(),
                    overall,
                    connectivity,
                    performance,
                    stability,
                    factors: HealthFactors {
                        uptime: uptime_factor(&parameters)
                            .unwrap_or_else(|| self.stability.uptime_score()),
                        response_time: self.stability.response_time_ms(),
                        error_rate: self.stability.error_rate(),
                        parameter_health: performance as f64,
                    },
                    calculated_at: Utc::now(),
                }
            }
            Err(e) => {
                debug!("device lookup failed, scoring as unreachable: {e}");
                HealthSnapshot {
                    device_id: device_id.to_string(),
                    overall: 0,
                    connectivity: 0,
                    performance: 0,
                    stability: 0,
                    factors: HealthFactors {
                        uptime: 0.0,
                        response_time: self.stability.response_time_ms(),
                        error_rate: 100.0,
                        parameter_health: 0.0,
                    },
                    calculated_at: Utc::now(),
                }
            }
        };

        if let Err(e) = self.storage.upsert_health_snapshot(snapshot.clone()).await {
            warn!("failed to persist health snapshot for {device_id}: {e}");
        }

        snapshot
    }
}

/// Uptime percentage derived from the device's reported uptime counter,
/// relative to a one week horizon.
fn uptime_factor(parameters: &[DeviceParameter]) -> Option<f64> {
    parameters
        .iter()
        .find(|parameter| parameter.path.contains("UpTime"))
        .and_then(|parameter| numeric_value(&parameter.value))
        .map(|seconds| (seconds / SECONDS_PER_WEEK * 100.0).min(100.0))
}
