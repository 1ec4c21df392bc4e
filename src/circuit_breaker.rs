//! # Circuit Breaker Module
//!
//! Stops calling the AI analysis endpoint after it fails repeatedly, so a
//! dead service costs one log line per report instead of a full timeout.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for a best-effort gateway
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold reached, requests are skipped
/// - **Half-Open**: Reset window elapsed, the next request is let through
///
/// # Examples
///
/// ```rust
/// use wellness::circuit_breaker::CircuitBreaker;
/// use wellness::config::BreakerConfig;
///
/// let breaker = CircuitBreaker::new(BreakerConfig::default());
/// assert!(!breaker.is_open());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// Check whether calls should currently be skipped.
    ///
    /// Resets to closed once the reset window has elapsed since the last failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count >= self.config.failure_threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < Duration::from_secs(self.config.reset_secs) {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 2,
            reset_secs: 60,
        });

        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_resets_after_window() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            reset_secs: 0,
        });

        breaker.record_failure();
        // zero-length window: already elapsed
        assert!(!breaker.is_open());
        assert!(!breaker.is_open());
    }
}
