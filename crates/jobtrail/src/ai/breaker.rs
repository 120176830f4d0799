//! Per-run circuit breaker for the AI extractor. Two consecutive timeouts
//! open the circuit for the remainder of the run: a local model that is
//! down or overloaded would otherwise add a full timeout to every message.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

#[derive(Debug)]
pub struct AiCircuitBreaker {
    state: BreakerState,
    consecutive_timeouts: u32,
    threshold: u32,
}

impl AiCircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        AiCircuitBreaker {
            state: BreakerState::Closed,
            consecutive_timeouts: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    pub fn record_timeout(&mut self) {
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts >= self.threshold {
            self.state = BreakerState::Open;
        }
    }

    /// Any completed attempt that was not a timeout breaks the streak,
    /// including malformed-output failures.
    pub fn record_non_timeout(&mut self) {
        if self.state == BreakerState::Closed {
            self.consecutive_timeouts = 0;
        }
    }
}
