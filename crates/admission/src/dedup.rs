//! FIFO content-hash deduplication window.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

pub fn content_hash(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

pub struct DedupWindow {
    capacity: usize,
    seen: Mutex<VecDeque<u64>>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, seen: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Returns `true` and records `hash` if it hasn't been seen in the
    /// window; returns `false` (and does not re-record) otherwise.
    pub fn admit(&self, hash: u64) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(&hash) {
            return false;
        }
        if seen.len() >= self.capacity {
            seen.pop_front();
        }
        seen.push_back(hash);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_within_window_is_rejected() {
        let window = DedupWindow::new(100);
        assert!(window.admit(content_hash("hello")));
        assert!(!window.admit(content_hash("hello")));
    }

    #[test]
    fn distinct_content_is_admitted() {
        let window = DedupWindow::new(100);
        assert!(window.admit(content_hash("a")));
        assert!(window.admit(content_hash("b")));
    }

    #[test]
    fn old_entries_age_out_of_a_small_window() {
        let window = DedupWindow::new(2);
        assert!(window.admit(content_hash("a")));
        assert!(window.admit(content_hash("b")));
        assert!(window.admit(content_hash("c")));
        assert!(window.admit(content_hash("a")));
    }
}
