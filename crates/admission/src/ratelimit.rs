//! Per-author sliding-window admission rate limit.
//!
//! Grounded on `message_processor.py`'s `RateLimiter`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

pub struct AuthorRateLimiter {
    max_messages: usize,
    period: Duration,
    history: Mutex<HashMap<String, VecDeque<Duration>>>,
}

impl AuthorRateLimiter {
    pub fn new(max_messages: usize, period: Duration) -> Self {
        Self { max_messages, period, history: Mutex::new(HashMap::new()) }
    }

    /// `now` is a monotonic timestamp from a shared [`voice_relay_core::Clock`].
    pub fn is_allowed(&self, author_id: &str, now: Duration) -> bool {
        let mut history = self.history.lock();
        let times = history.entry(author_id.to_string()).or_default();

        while let Some(&oldest) = times.front() {
            if now.saturating_sub(oldest) > self.period {
                times.pop_front();
            } else {
                break;
            }
        }

        if times.len() < self.max_messages {
            times.push_back(now);
            true
        } else {
            false
        }
    }

    /// Seconds remaining until the author's oldest tracked message ages out
    /// of the window, surfaced only for logging (not a command reply).
    pub fn remaining_cooldown(&self, author_id: &str, now: Duration) -> Option<u64> {
        let history = self.history.lock();
        let times = history.get(author_id)?;
        if times.len() < self.max_messages {
            return None;
        }
        let oldest = *times.front()?;
        let elapsed = now.saturating_sub(oldest);
        Some(self.period.saturating_sub(elapsed).as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_messages_per_window() {
        let limiter = AuthorRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.is_allowed("a", Duration::from_secs(0)));
        assert!(limiter.is_allowed("a", Duration::from_secs(1)));
        assert!(!limiter.is_allowed("a", Duration::from_secs(2)));
    }

    #[test]
    fn window_slides_forward() {
        let limiter = AuthorRateLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.is_allowed("a", Duration::from_secs(0)));
        assert!(!limiter.is_allowed("a", Duration::from_secs(5)));
        assert!(limiter.is_allowed("a", Duration::from_secs(11)));
    }

    #[test]
    fn per_author_windows_are_independent() {
        let limiter = AuthorRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.is_allowed("a", Duration::from_secs(0)));
        assert!(limiter.is_allowed("b", Duration::from_secs(0)));
    }

    #[test]
    fn remaining_cooldown_is_none_under_limit() {
        let limiter = AuthorRateLimiter::new(2, Duration::from_secs(60));
        limiter.is_allowed("a", Duration::from_secs(0));
        assert_eq!(limiter.remaining_cooldown("a", Duration::from_secs(0)), None);
    }
}
