//! Sliding-window request rate limiting.
//!
//! Used for the global requests-per-minute cap and for per-tenant RPM
//! quotas. A window keeps the timestamps of recent hits and admits a new
//! request only while the count inside the window stays under the limit.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Keyed sliding-window limiter.
pub struct RateLimiter {
    window: Duration,
    hits: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limiter with a one-minute window.
    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: DashMap::new(),
        }
    }

    /// Record a hit for `key` if it stays under `limit` within the window.
    /// A `limit` of zero means unlimited.
    pub fn try_acquire(&self, key: &str, limit: u32) -> bool {
        if limit == 0 {
            return true;
        }
        let now = Instant::now();
        let mut window = self.hits.entry(key.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) > self.window {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() as u32 >= limit {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Current hit count inside the window, without recording.
    pub fn current(&self, key: &str) -> u32 {
        let now = Instant::now();
        match self.hits.get(key) {
            Some(window) => window
                .iter()
                .filter(|at| now.duration_since(**at) <= self.window)
                .count() as u32,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_is_unlimited() {
        let limiter = RateLimiter::per_minute();
        for _ in 0..1000 {
            assert!(limiter.try_acquire("global", 0));
        }
    }

    #[test]
    fn test_limit_enforced_within_window() {
        let limiter = RateLimiter::per_minute();
        assert!(limiter.try_acquire("t1", 2));
        assert!(limiter.try_acquire("t1", 2));
        assert!(!limiter.try_acquire("t1", 2));
        // Separate keys have separate windows.
        assert!(limiter.try_acquire("t2", 2));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        assert!(limiter.try_acquire("t1", 1));
        assert!(!limiter.try_acquire("t1", 1));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire("t1", 1));
    }
}
