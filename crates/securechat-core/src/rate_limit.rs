//! Per-connection sliding-window rate limiting.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window event counter for one connection.
///
/// Stamps older than the window age out on the next check; there is no
/// explicit reset.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_events: usize,
    stamps: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_events: usize) -> Self {
        Self {
            window,
            max_events,
            stamps: VecDeque::with_capacity(max_events),
        }
    }

    /// Record an event now. Returns false if it must be dropped.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }

        if self.stamps.len() >= self.max_events {
            return false;
        }
        self.stamps.push_back(now);
        true
    }
}
