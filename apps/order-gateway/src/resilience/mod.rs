//! Backpressure primitives: the admission gate in front of the store and
//! the overload detector in front of the whole pipeline.

pub mod admission;
pub mod circuit_breaker;

pub use admission::{AdmissionConfig, AdmissionController, AdmissionPermit};
pub use circuit_breaker::{OverloadConfig, OverloadDetector, OverloadMetrics, OverloadState};
