//! A sliding-window event counter used to bound how many dispatches a
//! queue may start per window.
//!
//! This is a small mutex-guarded struct in the same vein as
//! `hook-common::health::HealthRegistry`'s guarded map: state lives
//! behind a single `tokio::sync::Mutex` and every public method takes
//! the lock for the duration of the operation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Window {
    events: VecDeque<(Instant, u32)>,
    window: Duration,
    max_events: u32,
}

impl Window {
    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, _)) = self.events.front() {
            if now.saturating_duration_since(ts) > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn count(&self, now: Instant) -> u32 {
        self.events
            .iter()
            .filter(|(ts, _)| now.saturating_duration_since(*ts) <= self.window)
            .map(|(_, n)| n)
            .sum()
    }
}

/// A thread-safe sliding-window rate limiter. `AddEvent`/`EventCount`/
/// `WaitTime` match spec.md §4.2 exactly.
pub struct RateLimiter {
    inner: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            inner: Mutex::new(Window {
                events: VecDeque::new(),
                window,
                max_events,
            }),
        }
    }

    /// Record `n` events at the current time, evicting anything that has
    /// aged out of the window first. O(k) in the number of evicted events.
    pub async fn add_event(&self, n: u32) {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        guard.evict(now);
        guard.events.push_back((now, n));
    }

    /// The sum of event counts whose timestamps fall within the window
    /// ending now.
    pub async fn event_count(&self) -> u32 {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        guard.evict(now);
        guard.count(now)
    }

    /// `0` if under the limit, otherwise the time until enough events age
    /// out of the window to bring the count strictly below `max_events`;
    /// `window` if no such point exists within the current window.
    pub async fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        guard.evict(now);

        let mut remaining = guard.count(now);
        if remaining < guard.max_events {
            return Duration::ZERO;
        }

        for &(ts, n) in &guard.events {
            remaining = remaining.saturating_sub(n);
            if remaining < guard.max_events {
                let age = now.saturating_duration_since(ts);
                return guard.window.saturating_sub(age);
            }
        }

        guard.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_empty() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        assert_eq!(limiter.event_count().await, 0);
        assert_eq!(limiter.wait_time().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn counts_events_within_window() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.add_event(3).await;
        limiter.add_event(1).await;
        assert_eq!(limiter.event_count().await, 4);
    }

    #[tokio::test]
    async fn wait_time_zero_under_limit() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.add_event(2).await;
        assert_eq!(limiter.wait_time().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn wait_time_positive_at_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.add_event(1).await;
        limiter.add_event(1).await;
        assert!(limiter.wait_time().await > Duration::ZERO);
        assert!(limiter.wait_time().await <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn evicts_expired_events() {
        let limiter = RateLimiter::new(2, Duration::from_millis(20));
        limiter.add_event(2).await;
        assert_eq!(limiter.event_count().await, 2);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(limiter.event_count().await, 0);
        assert_eq!(limiter.wait_time().await, Duration::ZERO);
    }
}
