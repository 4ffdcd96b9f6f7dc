//! In-memory parameter snapshot cache
//!
//! Holds the latest polled parameter snapshot per device. Threshold evaluation
//! and health scoring both read the snapshot written earlier in the same tick,
//! so the cache sits on the hot path of every poll.
//!
//! ## Concurrency
//!
//! Devices are polled concurrently within a tick, so the cache is backed by a
//! sharded [`DashMap`] keyed by device identity. Writes for one device never
//! serialize against reads for another.
//!
//! ## Staleness
//!
//! Snapshots are overwritten on every tick, so an entry is never older than
//! the last successful poll of its device. Devices removed from the fleet
//! leave orphaned entries behind; callers that care should run
//! [`ParameterCache::evict_stale`] periodically.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::DeviceParameter;

#[derive(Debug, Clone)]
struct CachedSnapshot {
    parameters: Vec<DeviceParameter>,
    updated_at: DateTime<Utc>,
}

/// Latest parameter snapshot per device, keyed by ACS device id.
#[derive(Debug, Default)]
pub struct ParameterCache {
    inner: DashMap<String, CachedSnapshot>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Store a snapshot for a device, replacing any previous one.
    pub fn insert_snapshot(&self, device_id: &str, parameters: Vec<DeviceParameter>) {
        self.inner.insert(
            device_id.to_string(),
            CachedSnapshot {
                parameters,
                updated_at: Utc::now(),
            },
        );
    }

    /// The latest snapshot for a device, if one has been polled.
    pub fn snapshot(&self, device_id: &str) -> Option<Vec<DeviceParameter>> {
        self.inner
            .get(device_id)
            .map(|entry| entry.parameters.clone())
    }

    /// When the device was last snapshotted.
    pub fn updated_at(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.inner.get(device_id).map(|entry| entry.updated_at)
    }

    /// Drop entries older than `ttl`. Returns the number of evicted devices.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let before = self.inner.len();
        self.inner.retain(|_, snapshot| snapshot.updated_at >= cutoff);
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
