//! Storage backends for inventory, samples, alerts and health snapshots
//!
//! Trait-based abstraction so the engine never depends on a concrete store.
//!
//! ## Backends
//!
//! - **SQLite** (default feature `storage-sqlite`): embedded, WAL mode,
//!   suitable for single-instance deployments
//! - **In-memory**: no persistence; tests and storage-less trials
//!
//! ## Write semantics
//!
//! All writes are idempotent: devices, health snapshots and monitoring
//! configs are upserts, parameter samples are duplicate-tolerant inserts. A
//! retried or duplicated tick therefore never corrupts state.

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, Storage};
pub use error::{StorageError, StorageResult};
pub use schema::{
    Alert, AlertStatus, DeviceRecord, HealthFactors, HealthSnapshot, NewAlert, SampleRow,
};
