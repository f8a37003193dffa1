use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tracing::debug;

use super::{operation::Operation, principal::Principal};
use crate::config::RateLimit;

type Key = (Principal, Operation);

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject { retry_after: Duration },
}

/// Admission timestamps for one (principal, operation) pair.
#[derive(Debug)]
struct RateWindow {
    hits: VecDeque<Instant>,
    window: Duration,
}

impl RateWindow {
    fn new(window: Duration) -> Self {
        Self {
            hits: VecDeque::new(),
            window,
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.hits
            .retain(|t| now.saturating_duration_since(*t) < window);
    }

    fn evaluate(&mut self, now: Instant, max_requests: usize) -> Admission {
        self.prune(now);
        if self.hits.len() >= max_requests {
            let retry_after = self
                .hits
                .iter()
                .min()
                .and_then(|oldest| oldest.checked_add(self.window))
                .map(|expiry| expiry.saturating_duration_since(now))
                .unwrap_or(self.window);
            return Admission::Reject {
                retry_after: retry_after.max(Duration::from_secs(1)),
            };
        }
        self.hits.push_back(now);
        Admission::Admit
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.hits
            .iter()
            .all(|t| now.saturating_duration_since(*t) >= self.window)
    }

    fn last_hit(&self) -> Option<Instant> {
        self.hits.iter().max().copied()
    }
}

/// Sliding-window limiter keyed by principal and operation.
///
/// Each key's prune/check/append runs under that key's shard lock, so two
/// concurrent requests for the same key can never both take the last slot.
/// The table holds at most `max_keys` windows: idle windows are swept, and
/// if that is not enough the least recently admitted keys are evicted.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<Key, RateWindow>,
    max_keys: usize,
}

impl RateLimiter {
    pub fn new(max_keys: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_keys: max_keys.max(1),
        }
    }

    pub fn admit(
        &self,
        principal: Principal,
        operation: Operation,
        now: Instant,
        limit: RateLimit,
    ) -> Admission {
        let key = (principal, operation);
        if !self.windows.contains_key(&key) && self.windows.len() >= self.max_keys {
            self.make_room(now);
        }

        let mut entry = self
            .windows
            .entry(key)
            .or_insert_with(|| RateWindow::new(limit.window));
        entry.window = limit.window;
        entry.evaluate(now, limit.max_requests)
    }

    /// Drops every window with no admission inside its span. Returns how many
    /// keys were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_idle(now));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, remaining = self.windows.len(), "rate windows swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Frees room for a new key. Idle windows go first; if the table is
    /// still nearly full, the least recently admitted keys are evicted in one
    /// batch so that the following inserts find headroom without rescanning.
    fn make_room(&self, now: Instant) {
        self.sweep(now);
        let target = self.max_keys.saturating_sub(self.evict_batch());
        if self.windows.len() <= target {
            return;
        }

        let mut by_recency: Vec<(Option<Instant>, Key)> = self
            .windows
            .iter()
            .map(|e| (e.value().last_hit(), *e.key()))
            .collect();
        let excess = by_recency.len() - target;
        if excess < by_recency.len() {
            by_recency.select_nth_unstable_by_key(excess, |(last, _)| *last);
        }
        for (_, key) in by_recency.into_iter().take(excess) {
            self.windows.remove(&key);
        }
        debug!(evicted = excess, remaining = self.windows.len(), "rate windows evicted");
    }

    fn evict_batch(&self) -> usize {
        (self.max_keys / 10).max(1)
    }
}
