//! Per-provider circuit breaker.
//!
//! ```text
//! Closed --(failure_threshold consecutive failures)--> Open
//! Open --(cooldown elapsed, next allows_request)--> HalfOpen
//! HalfOpen --(success)--> Closed
//! HalfOpen --(failure)--> Open
//! ```

use std::time::{Duration, Instant};

use serde::Serialize;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation; requests are sent.
    Closed,
    /// Too many consecutive failures; requests blocked until cooldown expires.
    Open,
    /// Cooldown expired; the next result decides.
    HalfOpen,
}

/// Circuit breaker for one provider.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: BreakerState,
    consecutive_failures: u32,
    last_transition: Instant,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_transition: Instant::now(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> BreakerState {
        self.state
    }

    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub const fn last_transition(&self) -> Instant {
        self.last_transition
    }

    /// Closed or half-open.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state != BreakerState::Open
    }

    /// Whether a request may be sent now.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and
    /// allows the request.
    pub fn allows_request(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if self.last_transition.elapsed() >= self.cooldown {
                    self.transition(BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful response. Closes the breaker.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state != BreakerState::Closed {
            self.transition(BreakerState::Closed);
        }
    }

    /// Record a failed response.
    ///
    /// Trips the breaker at the failure threshold, or immediately when
    /// half-open.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            BreakerState::HalfOpen => self.transition(BreakerState::Open),
            BreakerState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.transition(BreakerState::Open);
            }
            _ => {}
        }
    }

    fn transition(&mut self, next: BreakerState) {
        self.state = next;
        self.last_transition = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let mut breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allows_request());
        assert!(!breaker.is_available());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 2);
    }

    #[test]
    fn round_trip_through_half_open() {
        let mut breaker = CircuitBreaker::new(5, Duration::from_millis(20));
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allows_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_millis(10));
        breaker.record_failure();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allows_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allows_request());
    }
}
