//! Rate limiter for HTTP requests
//!
//! Provides protection against request floods by limiting how many requests
//! a single client may make per time window.
//!
//! # Design
//!
//! - Each client key (see [`lanshare_core::ClientAddr`]) gets a visitor record
//!   created lazily on its first request
//! - A visitor counts requests in its current window; the count restarts once
//!   the window has elapsed
//! - Visitors are locked individually, so clients never contend with each other
//! - A periodic purge drops visitors unseen for twice the window

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lanshare_core::{CoreError, RateLimitConfig};
use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum requests per window
const DEFAULT_MAX_REQUESTS: u32 = 300;

/// Window length (in seconds)
const DEFAULT_WINDOW_SECS: u64 = 60;

/// Rate limiter configuration
#[derive(Clone, Debug)]
pub struct RateLimiterConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

impl From<&RateLimitConfig> for RateLimiterConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
        }
    }
}

/// Request accounting for a single client
#[derive(Debug)]
struct Visitor {
    /// Requests seen in the current window
    count: u32,
    /// When the current window started
    window_start: Instant,
    /// Most recent request
    last_seen: Instant,
}

impl Visitor {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }
}

/// Per-client sliding-window rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    visitors: Arc<DashMap<String, Arc<Mutex<Visitor>>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default configuration
    pub fn new() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }

    /// Create a new rate limiter with custom configuration
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            config,
            visitors: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Count a request from `key` and decide whether it may proceed
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// [`allow`](Self::allow) evaluated at a given instant
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let visitor = self.visitor(key, now);
        let mut v = visitor.lock();

        if now.saturating_duration_since(v.window_start) > self.config.window {
            v.count = 0;
            v.window_start = now;
        }
        v.last_seen = now;
        v.count = v.count.saturating_add(1);

        let allowed = v.count <= self.config.max_requests;
        if !allowed {
            warn!(
                "Rate limiter: rejected {} ({} requests in window, max {})",
                key, v.count, self.config.max_requests
            );
        }
        allowed
    }

    /// Like [`allow`](Self::allow), as a result
    pub fn check(&self, key: &str) -> Result<(), CoreError> {
        if self.allow(key) {
            Ok(())
        } else {
            Err(CoreError::RateLimited)
        }
    }

    fn visitor(&self, key: &str, now: Instant) -> Arc<Mutex<Visitor>> {
        if let Some(v) = self.visitors.get(key) {
            return Arc::clone(v.value());
        }
        let entry = self
            .visitors
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Visitor::new(now))));
        Arc::clone(entry.value())
    }

    /// Drop visitors not seen for twice the window
    pub fn purge_stale(&self) -> usize {
        self.purge_stale_at(Instant::now())
    }

    /// [`purge_stale`](Self::purge_stale) evaluated at a given instant
    pub fn purge_stale_at(&self, now: Instant) -> usize {
        let max_idle = self.config.window.saturating_mul(2);
        let before = self.visitors.len();

        self.visitors.retain(|key, visitor| {
            let keep = now.saturating_duration_since(visitor.lock().last_seen) <= max_idle;
            if !keep {
                debug!("Rate limiter: cleaned up entry for {}", key);
            }
            keep
        });

        before.saturating_sub(self.visitors.len())
    }

    /// Run the purge loop until cancelled (call from a tokio task)
    pub async fn run_purge_loop(self, every: Duration, cancel: CancellationToken) {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    let purged = self.purge_stale();
                    if purged > 0 {
                        debug!("Rate limiter: purged {} stale visitors", purged);
                    }
                }
            }
        }
    }

    /// Get statistics about rate limiter state
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_tracked: self.visitors.len(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    /// Total number of tracked clients
    pub total_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::with_config(RateLimiterConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn test_allows_initial_requests() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("192.168.1.1"));
        assert_eq!(limiter.stats().total_tracked, 1);
    }

    #[test]
    fn test_rejects_over_limit() {
        let limiter = limiter(3, 60);
        let now = Instant::now();

        for i in 0..3 {
            assert!(limiter.allow_at("192.168.1.1", now + Duration::from_secs(i)));
        }
        assert!(!limiter.allow_at("192.168.1.1", now + Duration::from_secs(5)));
        assert!(matches!(limiter.check("192.168.1.1"), Err(CoreError::RateLimited)));
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(2, 60);
        let now = Instant::now();

        assert!(limiter.allow_at("ip", now));
        assert!(limiter.allow_at("ip", now));
        assert!(!limiter.allow_at("ip", now));

        let later = now + Duration::from_secs(61);
        assert!(limiter.allow_at("ip", later));
        assert!(limiter.allow_at("ip", later));
        assert!(!limiter.allow_at("ip", later));
    }

    #[test]
    fn test_steady_traffic_still_resets() {
        // Requests arriving inside the window must not keep extending it
        let limiter = limiter(2, 10);
        let now = Instant::now();

        assert!(limiter.allow_at("ip", now));
        assert!(limiter.allow_at("ip", now + Duration::from_secs(8)));
        assert!(!limiter.allow_at("ip", now + Duration::from_secs(9)));
        assert!(limiter.allow_at("ip", now + Duration::from_secs(11)));
    }

    #[test]
    fn test_different_clients_tracked_separately() {
        let limiter = limiter(1, 60);

        assert!(limiter.allow("192.168.1.1"));
        assert!(!limiter.allow("192.168.1.1"));
        assert!(limiter.allow("192.168.1.2"));
    }

    #[test]
    fn test_purge_stale() {
        let limiter = limiter(10, 60);
        let now = Instant::now();

        limiter.allow_at("old", now);
        limiter.allow_at("fresh", now + Duration::from_secs(100));

        assert_eq!(limiter.purge_stale_at(now + Duration::from_secs(110)), 0);
        assert_eq!(limiter.purge_stale_at(now + Duration::from_secs(121)), 1);
        assert_eq!(limiter.stats().total_tracked, 1);
    }

    #[test]
    fn test_concurrent_clients() {
        let limiter = limiter(100, 60);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    let key = format!("10.0.0.{}", t);
                    (0..100).all(|_| limiter.allow(&key))
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(limiter.stats().total_tracked, 8);
    }
}
