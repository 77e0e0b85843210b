//! Overload detector for the submission pipeline.
//!
//! Rejects new batch requests before they consume an admission slot or touch
//! the database, so that admission-gated requests cannot pile up waiting for
//! permits while the system is already saturated.
//!
//! # State machine
//!
//! ```text
//! CLOSED → OPEN       (pool utilization >= high water, or consecutive
//!                      batch failures >= threshold)
//! OPEN → HALF_OPEN    (cool-down elapsed)
//! HALF_OPEN → CLOSED  (probe batch succeeded)
//! HALF_OPEN → OPEN    (probe batch failed)
//! ```
//!
//! While OPEN, rejections carry the remaining cool-down as a suggested retry
//! delay.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Overload detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverloadState {
    /// Normal operation.
    Closed,
    /// Rejecting all new batches.
    Open,
    /// Admitting a single probe batch.
    HalfOpen,
}

impl std::fmt::Display for OverloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Overload detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverloadConfig {
    /// Pool utilization that opens the detector (default: 0.90).
    #[serde(default = "default_utilization_high_water")]
    pub utilization_high_water: f64,
    /// Consecutive batch failures that open the detector (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: u32,
    /// Time to stay open before probing (default: 30s).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for OverloadConfig {
    fn default() -> Self {
        Self {
            utilization_high_water: default_utilization_high_water(),
            consecutive_failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

const fn default_utilization_high_water() -> f64 {
    0.90
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown_secs() -> u64 {
    30
}

impl OverloadConfig {
    const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Detector that sheds batch submissions while the system is overloaded.
#[derive(Debug)]
pub struct OverloadDetector {
    config: OverloadConfig,
    state: RwLock<OverloadState>,
    /// When the detector last opened.
    opened_at: RwLock<Option<Instant>>,
    consecutive_failures: AtomicU32,
    /// Set while the single HALF_OPEN probe is outstanding.
    probe_in_flight: AtomicBool,
    state_transitions: AtomicU64,
    rejected_batches: AtomicU64,
}

impl OverloadDetector {
    /// Create a detector from configuration.
    #[must_use]
    pub fn new(config: OverloadConfig) -> Self {
        Self {
            config,
            state: RwLock::new(OverloadState::Closed),
            opened_at: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
            probe_in_flight: AtomicBool::new(false),
            state_transitions: AtomicU64::new(0),
            rejected_batches: AtomicU64::new(0),
        }
    }

    /// Current state, applying the time-based OPEN → HALF_OPEN transition.
    #[must_use]
    pub fn state(&self) -> OverloadState {
        self.check_cooldown();
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Decide whether a new batch may start.
    ///
    /// `pool_utilization` is the admission gate's current fill fraction,
    /// sampled by the caller. `Err` carries the suggested retry delay.
    pub fn check_admission(&self, pool_utilization: f64) -> Result<(), Duration> {
        self.check_cooldown();

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state {
            OverloadState::Closed => {
                if pool_utilization >= self.config.utilization_high_water {
                    tracing::warn!(
                        pool_utilization,
                        high_water = self.config.utilization_high_water,
                        "Pool utilization above high-water mark"
                    );
                    self.transition_to_open();
                    self.rejected_batches.fetch_add(1, Ordering::Relaxed);
                    return Err(self.config.cooldown());
                }
                Ok(())
            }
            OverloadState::Open => {
                self.rejected_batches.fetch_add(1, Ordering::Relaxed);
                Err(self.remaining_cooldown())
            }
            OverloadState::HalfOpen => {
                if self.probe_in_flight.swap(true, Ordering::AcqRel) {
                    // A probe is already out; everyone else keeps waiting.
                    self.rejected_batches.fetch_add(1, Ordering::Relaxed);
                    Err(self.config.cooldown())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Record a batch that completed without overall failure.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state == OverloadState::HalfOpen {
            self.probe_in_flight.store(false, Ordering::Release);
            self.transition_to_closed();
        }
    }

    /// Record a batch that failed overall.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state {
            OverloadState::HalfOpen => {
                self.probe_in_flight.store(false, Ordering::Release);
                self.transition_to_open();
            }
            OverloadState::Closed => {
                if failures >= self.config.consecutive_failure_threshold {
                    tracing::warn!(
                        consecutive_failures = failures,
                        threshold = self.config.consecutive_failure_threshold,
                        "Consecutive batch failures reached threshold"
                    );
                    self.transition_to_open();
                }
            }
            OverloadState::Open => {}
        }
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> OverloadMetrics {
        OverloadMetrics {
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            state_transitions: self.state_transitions.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
        }
    }

    /// Force the detector open (emergency shed / tests).
    pub fn force_open(&self) {
        self.transition_to_open();
    }

    /// Force the detector closed (operator recovery / tests).
    pub fn force_close(&self) {
        self.probe_in_flight.store(false, Ordering::Release);
        self.transition_to_closed();
    }

    fn remaining_cooldown(&self) -> Duration {
        let opened = *self
            .opened_at
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        opened.map_or_else(
            || self.config.cooldown(),
            |at| self.config.cooldown().saturating_sub(at.elapsed()),
        )
    }

    fn check_cooldown(&self) {
        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state != OverloadState::Open {
            return;
        }

        let elapsed = self
            .opened_at
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .map(|at| at.elapsed());

        if elapsed.is_some_and(|e| e >= self.config.cooldown()) {
            self.transition_to_half_open();
        }
    }

    fn transition_to_open(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous != OverloadState::Open {
            *state = OverloadState::Open;
            drop(state);

            let mut opened_at = self
                .opened_at
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *opened_at = Some(Instant::now());
            drop(opened_at);

            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::warn!(from = %previous, to = "OPEN", "Overload detector opened");
        }
    }

    fn transition_to_half_open(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous == OverloadState::Open {
            *state = OverloadState::HalfOpen;
            drop(state);

            self.probe_in_flight.store(false, Ordering::Release);
            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(from = %previous, to = "HALF_OPEN", "Overload detector probing");
        }
    }

    fn transition_to_closed(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;

        if previous != OverloadState::Closed {
            *state = OverloadState::Closed;
            drop(state);

            let mut opened_at = self
                .opened_at
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *opened_at = None;
            drop(opened_at);

            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.state_transitions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(from = %previous, to = "CLOSED", "Overload detector closed");
        }
    }
}

/// Metrics snapshot for the overload detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverloadMetrics {
    /// Current state.
    pub state: OverloadState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Number of state transitions.
    pub state_transitions: u64,
    /// Batches rejected while not CLOSED.
    pub rejected_batches: u64,
}
