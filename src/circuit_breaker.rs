//! # Circuit Breaker Module
//!
//! Stops calling the receipt scanning service after repeated exhausted scans
//! and lets it recover before new requests are sent upstream.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for receipt scans
///
/// # State Machine
///
/// - **Closed**: scans go upstream
/// - **Open**: `circuit_breaker_threshold` consecutive scans exhausted every
///   candidate; new scans fail fast
/// - **Closed again** once `circuit_breaker_reset_secs` have elapsed since
///   the last failure, or after any successful scan
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use kitchen_log::circuit_breaker::CircuitBreaker;
    /// use kitchen_log::config::RecoveryConfig;
    ///
    /// let breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether scans should be rejected without calling upstream
    pub fn is_open(&self) -> bool {
        let mut state = self.lock();

        if state.consecutive_failures < self.config.circuit_breaker_threshold {
            return false;
        }

        match state.last_failure {
            Some(last) if last.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs) => true,
            _ => {
                info!("Receipt scanning circuit breaker reset");
                *state = BreakerState::default();
                false
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures += 1;
        state.last_failure = Some(Instant::now());

        if state.consecutive_failures == self.config.circuit_breaker_threshold {
            warn!(
                failures = state.consecutive_failures,
                reset_secs = self.config.circuit_breaker_reset_secs,
                "Receipt scanning circuit breaker opened"
            );
        }
    }

    pub fn record_success(&self) {
        *self.lock() = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }
}
