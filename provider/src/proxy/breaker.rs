use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};
use thiserror::Error;

/// Parameters for a per-endpoint breaker.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Failure fraction over the rolling window that trips the breaker.
    pub error_rate: f64,
    /// Minimum observations before the error rate is considered.
    pub volume_threshold: usize,
    /// Width of the rolling outcome window.
    pub window: Duration,
    /// How long an open breaker rejects before admitting a probe.
    pub cooldown: Duration,
    /// In-flight request ceiling while closed.
    pub max_inflight: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_rate: 0.25,
            volume_threshold: 10,
            window: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
            max_inflight: 1500,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakerError {
    #[error("circuit open")]
    Open,

    #[error("too many requests in flight")]
    Overloaded,
}

/// Per-endpoint circuit breaker.
///
/// Transitions are driven solely by observed outcomes: the window tripping
/// opens the circuit, a cool-down admits a single probe, and the probe's
/// outcome closes or re-opens it. Every successful [`Breaker::admit`] must
/// be paired with exactly one [`Breaker::record`].
pub struct Breaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    inflight: AtomicUsize,
}

struct Inner {
    state: State,
    window: VecDeque<(Instant, bool)>,
}

// === impl Breaker ===

impl Breaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::new(),
            }),
            inflight: AtomicUsize::new(0),
        }
    }

    pub fn admit(&self) -> Result<(), BreakerError> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => {
                if self.inflight.load(Ordering::Acquire) >= self.config.max_inflight {
                    return Err(BreakerError::Overloaded);
                }
            }
            State::Open { since } => {
                if since.elapsed() < self.config.cooldown {
                    return Err(BreakerError::Open);
                }
                inner.state = State::HalfOpen;
            }
            State::HalfOpen => {
                // One probe at a time.
                if self.inflight.load(Ordering::Acquire) > 0 {
                    return Err(BreakerError::Open);
                }
            }
        }
        self.inflight.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn record(&self, success: bool) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
        let mut inner = self.inner.lock();
        match inner.state {
            State::HalfOpen => {
                if success {
                    inner.window.clear();
                    inner.state = State::Closed;
                } else {
                    inner.state = State::Open {
                        since: Instant::now(),
                    };
                }
            }
            State::Closed => {
                inner.window.push_back((Instant::now(), success));
                while inner
                    .window
                    .front()
                    .map(|(at, _)| at.elapsed() > self.config.window)
                    .unwrap_or(false)
                {
                    inner.window.pop_front();
                }

                let total = inner.window.len();
                if total >= self.config.volume_threshold {
                    let failures = inner.window.iter().filter(|(_, ok)| !ok).count();
                    if failures as f64 / total as f64 > self.config.error_rate {
                        inner.state = State::Open {
                            since: Instant::now(),
                        };
                        inner.window.clear();
                    }
                }
            }
            // A straggling outcome from before the trip.
            State::Open { .. } => {}
        }
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        matches!(self.inner.lock().state, State::Open { .. })
    }
}
