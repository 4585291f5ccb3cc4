//! Sliding-window rate limiting for SEI and IM sends

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Allows at most `limit` acquisitions in any `window`
#[derive(Debug, Clone)]
pub(crate) struct RateLimiter {
    limit: usize,
    window: Duration,
    granted: VecDeque<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            granted: VecDeque::with_capacity(limit.min(1024) as usize),
        }
    }

    /// Limiter from acquisitions per second
    pub(crate) fn per_second(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    /// Try to acquire a slot at `now`
    pub(crate) fn try_acquire_at(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.granted.front() {
            if now.duration_since(oldest) >= self.window {
                self.granted.pop_front();
            } else {
                break;
            }
        }

        if self.granted.len() < self.limit {
            self.granted.push_back(now);
            true
        } else {
            tracing::debug!(
                limit = self.limit,
                window_ms = self.window.as_millis() as u64,
                "Rate limit exceeded"
            );
            false
        }
    }

    /// Try to acquire a slot now
    pub(crate) fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }
}
