//! Fixed-window request limiter.
//!
//! Each key (a user id for downloads, a client IP for search listings) gets
//! `max_requests` per window. The counter for a key lives in a DashMap shard,
//! so the check-and-increment is atomic per key without a global lock.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::error::{LibraryError, LibraryResult};

/// Windows older than this many periods are dropped by `sweep`
const STALE_WINDOWS: u32 = 2;
/// Sweep once the map holds this many keys
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    name: &'static str,
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            name,
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Count one request for `key`; `false` once the window is exhausted.
    pub fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        if self.windows.len() >= SWEEP_THRESHOLD {
            self.sweep(now);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    pub fn check(&self, key: &str) -> LibraryResult<()> {
        if self.try_acquire_at(key, Instant::now()) {
            Ok(())
        } else {
            tracing::warn!(limiter = self.name, key, "Rate limit exceeded");
            Err(LibraryError::RateLimited)
        }
    }

    /// Drop windows that can no longer limit anything
    pub fn sweep(&self, now: Instant) {
        let horizon = self.window * STALE_WINDOWS;
        self.windows
            .retain(|_, w| now.duration_since(w.started) < horizon);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_exhausts_and_resets() {
        let limiter = RateLimiter::new("downloads", 3, Duration::from_secs(60));
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.try_acquire_at("user-1", t0));
        }
        assert!(!limiter.try_acquire_at("user-1", t0 + Duration::from_secs(59)));
        // Other keys have their own budget
        assert!(limiter.try_acquire_at("user-2", t0));

        assert!(limiter.try_acquire_at("user-1", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_check_maps_to_rate_limited() {
        let limiter = RateLimiter::new("search", 1, Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(matches!(
            limiter.check("10.0.0.1"),
            Err(LibraryError::RateLimited)
        ));
    }

    #[test]
    fn test_sweep_drops_stale_keys() {
        let limiter = RateLimiter::new("search", 5, Duration::from_secs(1));
        let t0 = Instant::now();
        limiter.try_acquire_at("a", t0);
        limiter.try_acquire_at("b", t0 + Duration::from_secs(2));
        limiter.sweep(t0 + Duration::from_secs(2));
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_concurrent_acquires_never_exceed_budget() {
        let limiter = std::sync::Arc::new(RateLimiter::new("downloads", 50, Duration::from_secs(600)));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.try_acquire_at("u", now)).count()
                })
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
    }
}
