//! HTTP response DTOs.
//!
//! The batch submission body is the domain `BatchSubmitResponse` serialized
//! as-is; only the surrounding health and overload payloads live here.

use serde::{Deserialize, Serialize};

use crate::resilience::OverloadState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Application version.
    pub version: String,
}

/// Overload and backpressure status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadStatusResponse {
    /// Detector state.
    pub state: OverloadState,
    /// Batch failures since the last success.
    pub consecutive_failures: u32,
    /// Detector state transitions since startup.
    pub state_transitions: u64,
    /// Batches rejected while not CLOSED.
    pub rejected_batches: u64,
    /// Admission gate fill fraction, 0.0..=1.0.
    pub pool_utilization: f64,
    /// Admission gate capacity.
    pub pool_capacity: usize,
    /// Admission slots currently free.
    pub pool_available: usize,
}
