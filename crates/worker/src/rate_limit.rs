//! Per-client sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default: 10 submissions per client per hour.
pub const DEFAULT_MAX_REQUESTS: usize = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Allows at most `max_requests` per client within any trailing `window`.
///
/// Each client keeps an ordered log of accepted request times; entries that
/// have left the window are purged on the next check for that client.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    log: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            log: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request now. `Err` carries how long until the next slot frees.
    pub async fn check(&self, client: &str) -> Result<(), Duration> {
        self.check_at(client, Instant::now()).await
    }

    pub async fn check_at(&self, client: &str, now: Instant) -> Result<(), Duration> {
        let mut log = self.log.lock().await;
        let entries = log.entry(client.to_string()).or_default();

        while let Some(&oldest) = entries.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.max_requests {
            let retry_after = entries
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        entries.push_back(now);
        Ok(())
    }

    /// Forget clients with no request inside the window.
    pub async fn prune_idle(&self, now: Instant) -> usize {
        let mut log = self.log.lock().await;
        let before = log.len();
        log.retain(|_, entries| {
            entries
                .back()
                .is_some_and(|&latest| now.saturating_duration_since(latest) < self.window)
        });
        before - log.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
