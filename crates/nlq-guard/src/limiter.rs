//! Per-identity sliding-window admission control
//!
//! Each identity owns a window of recent attempt timestamps behind its own
//! mutex, so callers for different identities never contend. Windows live in
//! a Moka cache bounded by capacity and idle time, so identities that stop
//! sending requests are evicted.
//!
//! Evicting an identity drops its window, so its next attempt starts a fresh
//! quota. Idle eviction only happens after a full window of silence, which is
//! harmless. Capacity eviction is not: the cache never holds fewer than
//! [`MIN_TRACKED_IDENTITIES`] windows, and Moka's frequency-based admission
//! favours identities that keep sending over a flood of one-off keys.

use moka::sync::Cache;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const RETRY_AFTER: Duration = Duration::from_secs(60);

/// Lower bound on tracked identities, whatever the configured capacity.
pub const MIN_TRACKED_IDENTITIES: u64 = 1_024;

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Set only when denied.
    pub retry_after: Option<Duration>,
}

pub struct RateLimiter {
    limit: usize,
    windows: Cache<Arc<str>, Arc<Mutex<VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: usize, max_identities: u64) -> Self {
        let windows = Cache::builder()
            .max_capacity(max_identities.max(MIN_TRACKED_IDENTITIES))
            .time_to_idle(RATE_WINDOW)
            .build();

        Self {
            limit: limit_per_minute,
            windows,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    ///
    /// Every attempt, admitted or denied, is recorded in the window. Only the
    /// newest `limit + 1` stamps are kept: that is enough to tell whether the
    /// window holds more than `limit` attempts.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let window = self
            .windows
            .get_with(Arc::from(key), || Arc::new(Mutex::new(VecDeque::new())));

        let mut stamps = window.lock();
        if let Some(cutoff) = now.checked_sub(RATE_WINDOW) {
            while stamps.front().is_some_and(|t| *t < cutoff) {
                stamps.pop_front();
            }
        }

        stamps.push_back(now);
        while stamps.len() > self.limit + 1 {
            stamps.pop_front();
        }

        let count = stamps.len();
        if count > self.limit {
            tracing::warn!(identity = key, count, limit = self.limit, "Rate limit exceeded");
            Admission {
                admitted: false,
                limit: self.limit,
                remaining: 0,
                retry_after: Some(RETRY_AFTER),
            }
        } else {
            Admission {
                admitted: true,
                limit: self.limit,
                remaining: self.limit.saturating_sub(count),
                retry_after: None,
            }
        }
    }

    /// Approximate number of identities currently tracked.
    pub fn tracked_identities(&self) -> u64 {
        self.windows.run_pending_tasks();
        self.windows.entry_count()
    }
}
