//! Integration tests for the telemetry engine

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/pipeline.rs"]
mod pipeline;

#[path = "integration/sync_flow.rs"]
mod sync_flow;
