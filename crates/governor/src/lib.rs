//! Request governor: global rate limiting plus a circuit breaker wrapping
//! every outbound call to the chat platform's Service API.
//!
//! Grounded on `voice/ratelimit.py`'s `SimpleRateLimiter` and
//! `CircuitBreaker` classes, reshaped from module-level mutable state into
//! an explicitly-constructed, injectable component per the design notes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use voice_relay_core::model::{CircuitBreakerState, CircuitState, RateGovernorState};
use voice_relay_core::{Clock, Error, Result};

/// Outcome of a single attempt through [`RateGovernor::with_governor`]'s
/// wrapped call, distinguishing a rate-limit rejection (never counted
/// against the breaker) from any other failure.
pub enum CallOutcome<T> {
    Success(T),
    RateLimited { retry_after: Duration },
    Failure(Error),
}

pub struct RateGovernor {
    clock: Arc<dyn Clock>,
    rate_limit_per_second: u32,
    state: Mutex<RateGovernorState>,
    breaker: Mutex<CircuitBreakerState>,
}

impl RateGovernor {
    pub fn new(clock: Arc<dyn Clock>, rate_limit_per_second: u32, failure_threshold: u32, recovery_seconds: u64) -> Self {
        Self {
            clock,
            rate_limit_per_second: rate_limit_per_second.max(1),
            state: Mutex::new(RateGovernorState::default()),
            breaker: Mutex::new(CircuitBreakerState::new(failure_threshold, recovery_seconds)),
        }
    }

    fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_limit_per_second as f64)
    }

    /// Cooperatively waits so that successive calls are spaced at least
    /// `1 / rate_limit_per_second` apart.
    pub async fn await_slot(&self) {
        let wait = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            let wait = match state.last_emit_monotonic {
                Some(last) if now.saturating_sub(last) < self.min_interval() => {
                    Some(self.min_interval() - now.saturating_sub(last))
                }
                _ => None,
            };
            state.last_emit_monotonic = Some(now);
            wait
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
            self.state.lock().last_emit_monotonic = Some(self.clock.now());
        }
    }

    /// Returns `Ok(())` if a call may proceed, transitioning `OPEN` to
    /// `HALF_OPEN` once `recovery_seconds` have elapsed.
    fn admit(&self) -> Result<()> {
        let mut breaker = self.breaker.lock();
        match breaker.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let now = self.clock.now();
                let elapsed = breaker
                    .last_failure_monotonic
                    .map(|last| now.saturating_sub(last))
                    .unwrap_or(Duration::MAX);
                if elapsed >= Duration::from_secs(breaker.recovery_seconds) {
                    breaker.state = CircuitState::HalfOpen;
                    info!("circuit breaker transitioning to HALF_OPEN");
                    Ok(())
                } else {
                    Err(Error::CircuitOpen)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock();
        if breaker.state != CircuitState::Closed {
            info!("circuit breaker transitioning to CLOSED");
        }
        breaker.state = CircuitState::Closed;
        breaker.failure_count = 0;
    }

    fn record_failure(&self) {
        let mut breaker = self.breaker.lock();
        breaker.failure_count += 1;
        breaker.last_failure_monotonic = Some(self.clock.now());
        if breaker.failure_count >= breaker.failure_threshold {
            if breaker.state != CircuitState::Open {
                warn!(failures = breaker.failure_count, "circuit breaker transitioning to OPEN");
            }
            breaker.state = CircuitState::Open;
        }
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        *self.breaker.lock()
    }

    /// Runs `f` under the rate limiter and circuit breaker. On a rate-limit
    /// rejection, sleeps for the server-indicated interval (1s if absent)
    /// and retries exactly once; the second attempt's result is final
    /// regardless of outcome.
    pub async fn with_governor<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        self.admit()?;
        self.await_slot().await;

        match f().await {
            CallOutcome::Success(v) => {
                self.record_success();
                Ok(v)
            }
            CallOutcome::RateLimited { retry_after } => {
                let retry_after = if retry_after.is_zero() { Duration::from_secs(1) } else { retry_after };
                debug!(?retry_after, "rate-limited by Service, retrying once");
                tokio::time::sleep(retry_after).await;
                self.await_slot().await;
                match f().await {
                    CallOutcome::Success(v) => {
                        self.record_success();
                        Ok(v)
                    }
                    CallOutcome::RateLimited { .. } => Err(Error::TransientTransport(
                        "rate-limited twice in a row".to_string(),
                    )),
                    CallOutcome::Failure(e) => {
                        self.record_failure();
                        Err(e)
                    }
                }
            }
            CallOutcome::Failure(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_core::FakeClock;

    fn governor() -> (RateGovernor, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        (RateGovernor::new(clock.clone(), 50, 5, 60), clock)
    }

    #[tokio::test]
    async fn closed_breaker_allows_calls() {
        let (gov, _clock) = governor();
        let result = gov.with_governor(|| async { CallOutcome::<()>::Success(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_failures() {
        let (gov, clock) = governor();
        for _ in 0..5 {
            let _ = gov
                .with_governor(|| async { CallOutcome::<()>::Failure(Error::DegradedEngine("boom".into())) })
                .await;
            clock.advance(Duration::from_millis(50));
        }
        assert_eq!(gov.breaker_state().state, CircuitState::Open);
        let result = gov.with_governor(|| async { CallOutcome::<()>::Success(()) }).await;
        assert!(matches!(result, Err(Error::CircuitOpen)));
    }

    #[tokio::test]
    async fn breaker_half_opens_after_recovery_and_closes_on_success() {
        let (gov, clock) = governor();
        for _ in 0..5 {
            let _ = gov
                .with_governor(|| async { CallOutcome::<()>::Failure(Error::DegradedEngine("boom".into())) })
                .await;
        }
        assert_eq!(gov.breaker_state().state, CircuitState::Open);
        clock.advance(Duration::from_secs(61));
        let result = gov.with_governor(|| async { CallOutcome::<()>::Success(()) }).await;
        assert!(result.is_ok());
        assert_eq!(gov.breaker_state().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn rate_limited_once_then_succeeds_is_retried_and_does_not_count_as_failure() {
        let (gov, _clock) = governor();
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempts2 = attempts.clone();
        let result = gov
            .with_governor(move || {
                let attempts = attempts2.clone();
                async move {
                    if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                        CallOutcome::RateLimited { retry_after: Duration::from_millis(1) }
                    } else {
                        CallOutcome::Success(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(gov.breaker_state().failure_count, 0);
    }
}
