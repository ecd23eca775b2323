//! Failure ledger: sliding-window disconnection counters plus a
//! duration-based TTS-unavailability tracker, and the termination policy
//! over both.
//!
//! Grounded on `health_monitor.py`'s `_termination_conditions`. The original
//! tracks the API-unavailable condition two different ways in the same
//! class: `record_api_failure` bumps a count toward a 900 threshold (which
//! at a 60s check interval would take ~15 hours to ever fire), while
//! `_check_termination_conditions` actually triggers off
//! `now - last_reset >= 900` seconds, i.e. real wall-clock unavailability.
//! Only the second reading is self-consistent and matches the "≥ 900
//! seconds" wording, so this ledger tracks unavailability as a duration
//! (a `since` timestamp that resets on the next success) rather than a
//! check count.

use std::time::Duration;

use parking_lot::Mutex;

use voice_relay_core::{Clock, FailureCounter};

pub struct FailureLedgerConfig {
    pub disconnect_10m_max: u32,
    pub disconnect_30m_max: u32,
    pub disconnect_1h_max: u32,
    pub api_unavailable_threshold_s: u64,
}

impl Default for FailureLedgerConfig {
    fn default() -> Self {
        Self {
            disconnect_10m_max: 5,
            disconnect_30m_max: 10,
            disconnect_1h_max: 20,
            api_unavailable_threshold_s: 900,
        }
    }
}

pub struct FailureLedger {
    clock: std::sync::Arc<dyn Clock>,
    disconnect_10m: Mutex<FailureCounter>,
    disconnect_30m: Mutex<FailureCounter>,
    disconnect_1h: Mutex<FailureCounter>,
    api_unavailable_since: Mutex<Option<Duration>>,
    config: FailureLedgerConfig,
}

impl FailureLedger {
    pub fn new(clock: std::sync::Arc<dyn Clock>, config: FailureLedgerConfig) -> Self {
        let now = clock.now();
        Self {
            disconnect_10m: Mutex::new(FailureCounter::new(config.disconnect_10m_max, Some(600), now)),
            disconnect_30m: Mutex::new(FailureCounter::new(config.disconnect_30m_max, Some(1800), now)),
            disconnect_1h: Mutex::new(FailureCounter::new(config.disconnect_1h_max, Some(3600), now)),
            api_unavailable_since: Mutex::new(None),
            clock,
            config,
        }
    }

    fn bump(&self, counter: &Mutex<FailureCounter>) {
        let now = self.clock.now();
        let mut c = counter.lock();
        if let Some(window) = c.window_seconds {
            if now.saturating_sub(c.window_start_monotonic) > Duration::from_secs(window) {
                c.current_count = 0;
                c.window_start_monotonic = now;
            }
        }
        c.current_count += 1;
    }

    pub fn record_voice_disconnect(&self) {
        self.bump(&self.disconnect_10m);
        self.bump(&self.disconnect_30m);
        self.bump(&self.disconnect_1h);
    }

    pub fn record_api_failure(&self) {
        let mut since = self.api_unavailable_since.lock();
        if since.is_none() {
            *since = Some(self.clock.now());
        }
    }

    pub fn record_api_success(&self) {
        *self.api_unavailable_since.lock() = None;
    }

    pub fn disconnect_counts(&self) -> (u32, u32, u32) {
        (
            self.disconnect_10m.lock().current_count,
            self.disconnect_30m.lock().current_count,
            self.disconnect_1h.lock().current_count,
        )
    }

    pub fn api_unavailable_seconds(&self) -> u64 {
        match *self.api_unavailable_since.lock() {
            Some(since) => self.clock.now().saturating_sub(since).as_secs(),
            None => 0,
        }
    }

    /// Returns the termination reason, if any threshold has been breached.
    pub fn should_terminate(&self) -> Option<String> {
        if self.disconnect_10m.lock().exceeded() {
            return Some(format!(
                "voice disconnections exceeded {} in 10 minutes",
                self.config.disconnect_10m_max
            ));
        }
        if self.disconnect_30m.lock().exceeded() {
            return Some(format!(
                "voice disconnections exceeded {} in 30 minutes",
                self.config.disconnect_30m_max
            ));
        }
        if self.disconnect_1h.lock().exceeded() {
            return Some(format!(
                "voice disconnections exceeded {} in 1 hour",
                self.config.disconnect_1h_max
            ));
        }
        let unavailable = self.api_unavailable_seconds();
        if unavailable >= self.config.api_unavailable_threshold_s {
            return Some(format!("TTS API unavailable for {unavailable}s"));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use voice_relay_core::FakeClock;

    fn ledger() -> (Arc<FakeClock>, FailureLedger) {
        let clock = Arc::new(FakeClock::new());
        let ledger = FailureLedger::new(clock.clone(), FailureLedgerConfig::default());
        (clock, ledger)
    }

    #[test]
    fn five_disconnects_within_10_minutes_triggers_termination() {
        let (_clock, ledger) = ledger();
        for _ in 0..5 {
            ledger.record_voice_disconnect();
        }
        assert!(ledger.should_terminate().unwrap().contains("10 minutes"));
    }

    #[test]
    fn four_disconnects_within_10_minutes_does_not_trigger() {
        let (_clock, ledger) = ledger();
        for _ in 0..4 {
            ledger.record_voice_disconnect();
        }
        assert!(ledger.should_terminate().is_none());
    }

    #[test]
    fn disconnect_window_resets_after_it_elapses() {
        let (clock, ledger) = ledger();
        for _ in 0..4 {
            ledger.record_voice_disconnect();
        }
        clock.advance(Duration::from_secs(601));
        ledger.record_voice_disconnect();
        assert_eq!(ledger.disconnect_counts().0, 1);
    }

    #[test]
    fn api_unavailable_past_threshold_triggers_termination() {
        let (clock, ledger) = ledger();
        ledger.record_api_failure();
        clock.advance(Duration::from_secs(900));
        assert!(ledger.should_terminate().unwrap().contains("TTS API"));
    }

    #[test]
    fn api_success_resets_unavailability_clock() {
        let (clock, ledger) = ledger();
        ledger.record_api_failure();
        clock.advance(Duration::from_secs(500));
        ledger.record_api_success();
        clock.advance(Duration::from_secs(500));
        assert!(ledger.should_terminate().is_none());
        assert_eq!(ledger.api_unavailable_seconds(), 0);
    }

    #[test]
    fn repeated_failures_do_not_push_back_the_since_timestamp() {
        let (clock, ledger) = ledger();
        ledger.record_api_failure();
        clock.advance(Duration::from_secs(400));
        ledger.record_api_failure();
        clock.advance(Duration::from_secs(500));
        assert!(ledger.should_terminate().unwrap().contains("TTS API"));
    }
}
