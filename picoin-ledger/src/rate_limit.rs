//! Per-user sliding-window rate limiting
//!
//! Every mutating ledger operation must be admitted here first. A user is
//! admitted while fewer than `max_transactions` admissions fall inside the
//! trailing window; expired timestamps are pruned on every check, so the
//! history per user never exceeds `max_transactions` entries.
//!
//! Each user's window sits behind its own mutex. Check and record happen
//! under that mutex, and multi-user admissions hold every involved mutex
//! (taken in user-id order) for the whole decision.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Admission timestamps for one user
#[derive(Debug, Default)]
struct SlidingWindow {
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Drop timestamps that left the window
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admissions still inside the window (read-only)
    fn recent(&self, now: Instant, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|&&ts| now.saturating_duration_since(ts) < window)
            .count()
    }

    /// Prune, then whether one more admission fits under `max`
    fn has_room(&mut self, now: Instant, window: Duration, max: usize) -> bool {
        self.prune(now, window);
        self.timestamps.len() < max
    }
}

/// Read-only view of a user's quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// Admissions inside the current window
    pub recent_count: usize,
    /// Admissions allowed per window
    pub max: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Whether the next operation would be rejected
    pub is_limited: bool,
    /// Admissions left in the current window
    pub remaining: usize,
}

/// Sliding-window rate limiter keyed by user id
#[derive(Debug)]
pub struct RateLimiter {
    max_transactions: usize,
    window: Duration,
    windows: DashMap<String, Arc<Mutex<SlidingWindow>>>,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_transactions: config.max_transactions,
            window: config.window(),
            windows: DashMap::new(),
        }
    }

    /// Admit and record one operation for `user_id`
    pub fn check_and_record(&self, user_id: &str) -> bool {
        self.check_and_record_at(user_id, Instant::now())
    }

    /// [`check_and_record`](Self::check_and_record) at an explicit instant
    pub fn check_and_record_at(&self, user_id: &str, now: Instant) -> bool {
        self.check_and_record_all_at(&[user_id], now)
    }

    /// Admit an operation involving several users only if all are admitted
    ///
    /// Records one admission per distinct user when it succeeds; records
    /// nothing when any user is over quota.
    pub fn check_and_record_all(&self, user_ids: &[&str]) -> bool {
        self.check_and_record_all_at(user_ids, Instant::now())
    }

    /// [`check_and_record_all`](Self::check_and_record_all) at an explicit instant
    pub fn check_and_record_all_at(&self, user_ids: &[&str], now: Instant) -> bool {
        let mut ids: Vec<&str> = user_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        // Shard guards are released here; only the window mutexes stay held
        let handles: Vec<Arc<Mutex<SlidingWindow>>> =
            ids.iter().map(|id| self.window_handle(id)).collect();
        let mut guards: Vec<_> = handles.iter().map(|handle| handle.lock()).collect();

        let admitted = guards
            .iter_mut()
            .all(|window| window.has_room(now, self.window, self.max_transactions));
        if admitted {
            for window in &mut guards {
                window.timestamps.push_back(now);
            }
        }
        admitted
    }

    fn window_handle(&self, user_id: &str) -> Arc<Mutex<SlidingWindow>> {
        if let Some(entry) = self.windows.get(user_id) {
            return entry.value().clone();
        }
        self.windows
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Quota introspection; does not count as an operation
    pub fn status(&self, user_id: &str) -> RateLimitStatus {
        self.status_at(user_id, Instant::now())
    }

    /// [`status`](Self::status) at an explicit instant
    pub fn status_at(&self, user_id: &str, now: Instant) -> RateLimitStatus {
        let recent_count = self
            .windows
            .get(user_id)
            .map(|entry| entry.value().lock().recent(now, self.window))
            .unwrap_or(0);

        RateLimitStatus {
            recent_count,
            max: self.max_transactions,
            window_ms: self.window.as_millis() as u64,
            is_limited: recent_count >= self.max_transactions,
            remaining: self.max_transactions.saturating_sub(recent_count),
        }
    }

    /// Drop users whose whole history has expired
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    /// [`purge_idle`](Self::purge_idle) at an explicit instant
    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, handle| {
            // A handle cloned out by an in-flight admission keeps the entry
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            let mut window = handle.lock();
            window.prune(now, self.window);
            !window.timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Clear history for a user (administrative reset)
    pub fn reset(&self, user_id: &str) {
        self.windows.remove(user_id);
    }

    /// Number of users with tracked history
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}
