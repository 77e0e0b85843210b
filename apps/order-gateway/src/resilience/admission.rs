//! Admission control for database-touching work.
//!
//! Every store operation in the submission path passes through a
//! fixed-capacity counting gate sized below the shared connection pool, so
//! submission traffic can never exhaust the pool. `acquire` waits a short,
//! bounded time; on timeout the operation is treated as failed - callers
//! never spin on the gate. This converts unbounded queuing at the database
//! into fast-failing backpressure at the application edge.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admission gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Concurrent store operations allowed (default: 25).
    #[serde(default = "default_permits")]
    pub permits: usize,
    /// How long `acquire` may wait before failing fast (default: 2s).
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            permits: default_permits(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

const fn default_permits() -> usize {
    25
}

const fn default_acquire_timeout_ms() -> u64 {
    2_000
}

/// A held admission slot. Dropping it releases the slot, so release is
/// guaranteed on every exit path.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Counting gate in front of the order store.
#[derive(Debug)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
}

impl AdmissionController {
    /// Create a gate from configuration.
    #[must_use]
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.permits)),
            capacity: config.permits,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }

    /// Acquire one slot, waiting at most the configured timeout.
    ///
    /// `None` means the gate is saturated; the caller must fail the
    /// operation, never retry in a loop.
    pub async fn acquire(&self) -> Option<AdmissionPermit> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => Some(AdmissionPermit { _permit: permit }),
            // Closed semaphore or elapsed timeout both mean "not admitted".
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Fraction of slots currently held, 0.0..=1.0.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        let held = self.capacity - self.semaphore.available_permits();
        held as f64 / self.capacity as f64
    }

    /// Total slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(permits: usize, timeout_ms: u64) -> AdmissionController {
        AdmissionController::new(&AdmissionConfig {
            permits,
            acquire_timeout_ms: timeout_ms,
        })
    }

    #[tokio::test]
    async fn acquire_succeeds_when_slots_free() {
        let gate = controller(2, 50);
        let permit = gate.acquire().await;
        assert!(permit.is_some());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn acquire_times_out_when_exhausted() {
        let gate = controller(1, 20);
        let held = gate.acquire().await.unwrap();

        let start = std::time::Instant::now();
        let second = gate.acquire().await;
        assert!(second.is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));

        drop(held);
    }

    #[tokio::test]
    async fn dropping_permit_frees_slot() {
        let gate = controller(1, 20);
        {
            let _permit = gate.acquire().await.unwrap();
            assert_eq!(gate.available(), 0);
        }
        assert_eq!(gate.available(), 1);
        assert!(gate.acquire().await.is_some());
    }

    #[tokio::test]
    async fn utilization_tracks_held_slots() {
        let gate = controller(4, 20);
        assert!((gate.utilization() - 0.0).abs() < f64::EPSILON);

        let _a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        assert!((gate.utilization() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn default_config_matches_pool_headroom() {
        let config = AdmissionConfig::default();
        assert_eq!(config.permits, 25);
        assert_eq!(config.acquire_timeout_ms, 2_000);
    }
}
