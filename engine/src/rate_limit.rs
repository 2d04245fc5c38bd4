use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limited: bool,
    pub retry_after: Duration,
}

impl RateLimitStatus {
    const ALLOWED: Self = Self {
        limited: false,
        retry_after: Duration::ZERO,
    };

    /// Whole seconds to wait, never below one while limited.
    pub fn retry_after_secs(&self) -> u64 {
        if !self.limited {
            return 0;
        }
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            (secs + 1).max(1)
        } else {
            secs.max(1)
        }
    }
}

/// Sliding-window limiter keyed by actor id.
///
/// State is in memory only and resets with the process.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<HashMap<u64, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Prune the actor's window and report whether another call is allowed.
    pub async fn is_limited(&self, actor_id: u64) -> RateLimitStatus {
        let now = Instant::now();
        let mut calls = self.calls.lock().await;
        match calls.get_mut(&actor_id) {
            Some(entries) => self.check(entries, now),
            None => RateLimitStatus::ALLOWED,
        }
    }

    /// Check and record under one lock. A call is recorded only when it is
    /// allowed, so concurrent requests cannot both take the last slot.
    pub async fn try_acquire(&self, actor_id: u64) -> RateLimitStatus {
        let now = Instant::now();
        let mut calls = self.calls.lock().await;
        let entries = calls.entry(actor_id).or_default();
        let status = self.check(entries, now);
        if !status.limited {
            entries.push_back(now);
        }
        status
    }

    fn check(&self, entries: &mut VecDeque<Instant>, now: Instant) -> RateLimitStatus {
        prune(entries, now, self.window);
        if entries.len() < self.max_calls {
            return RateLimitStatus::ALLOWED;
        }
        let retry_after = entries
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO);
        RateLimitStatus {
            limited: true,
            retry_after,
        }
    }

    pub async fn record_call(&self, actor_id: u64) {
        let now = Instant::now();
        let mut calls = self.calls.lock().await;
        calls.entry(actor_id).or_default().push_back(now);
    }

    pub async fn reset(&self, actor_id: u64) {
        self.calls.lock().await.remove(&actor_id);
    }

    /// Drop actors with no calls left in the window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut calls = self.calls.lock().await;
        calls.retain(|_, entries| {
            prune(entries, now, self.window);
            !entries.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_actors(&self) -> usize {
        self.calls.lock().await.len()
    }
}

fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = entries.front() {
        if now.duration_since(*oldest) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limits_after_max_calls_and_recovers_after_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(!limiter.is_limited(1).await.limited);
            limiter.record_call(1).await;
        }

        let status = limiter.is_limited(1).await;
        assert!(status.limited);
        assert!(status.retry_after > Duration::ZERO);
        assert_eq!(status.retry_after_secs(), 60);

        tokio::time::advance(Duration::from_secs(20)).await;
        let status = limiter.is_limited(1).await;
        assert!(status.limited);
        assert_eq!(status.retry_after, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(!limiter.is_limited(1).await.limited);
    }

    #[tokio::test(start_paused = true)]
    async fn actors_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        limiter.record_call(1).await;
        assert!(limiter.is_limited(1).await.limited);
        assert!(!limiter.is_limited(2).await.limited);

        limiter.reset(1).await;
        assert!(!limiter.is_limited(1).await.limited);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_one_call_at_a_time() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        limiter.record_call(1).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.record_call(1).await;
        assert!(limiter.is_limited(1).await.limited);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!limiter.is_limited(1).await.limited);
        limiter.record_call(1).await;
        let status = limiter.is_limited(1).await;
        assert!(status.limited);
        assert_eq!(status.retry_after, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_forgets_idle_actors() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        limiter.record_call(1).await;
        limiter.record_call(2).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.record_call(2).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_actors().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_records_only_allowed_calls() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(!limiter.try_acquire(1).await.limited);
        assert!(!limiter.try_acquire(1).await.limited);
        let status = limiter.try_acquire(1).await;
        assert!(status.limited);
        assert_eq!(status.retry_after, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!limiter.try_acquire(1).await.limited);
        assert!(!limiter.try_acquire(1).await.limited);
        assert!(limiter.try_acquire(1).await.limited);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_acquires_never_exceed_the_limit() {
        let limiter = std::sync::Arc::new(RateLimiter::new(5, Duration::from_secs(60)));
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { !limiter.try_acquire(1).await.limited })
            })
            .collect();
        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let status = RateLimitStatus {
            limited: true,
            retry_after: Duration::from_millis(200),
        };
        assert_eq!(status.retry_after_secs(), 1);
        let status = RateLimitStatus {
            limited: true,
            retry_after: Duration::from_millis(2500),
        };
        assert_eq!(status.retry_after_secs(), 3);
    }
}
