//! Typed client for the ACS northbound interface
//!
//! The ACS (auto-configuration server) is the single source of truth for the
//! live state of every managed device. This module wraps its HTTP NBI behind a
//! typed request/response API.
//!
//! ## Design
//!
//! - **Explicit instances**: an [`AcsClient`] is constructed from one
//!   [`crate::config::MonitoringConfig`] and passed into each engine component.
//!   No global singleton, so multiple configs can run side by side.
//! - **No retries**: every call is a single round trip with the configured
//!   timeout. Callers decide retry policy (the poll loop retries naturally on
//!   the next tick).
//! - **Typed failures**: errors surface as [`AcsError`] carrying the upstream
//!   status and message. A device simply lacking a value for a parameter is
//!   not an error; it shows up as an absent entry.

pub mod client;
pub mod error;
pub mod types;

pub use client::AcsClient;
pub use error::{AcsError, AcsResult};
pub use types::{AcsParameter, AcsTask, RemoteDevice};
