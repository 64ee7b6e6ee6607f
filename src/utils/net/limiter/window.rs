//! Sliding window request limiter
//!
//! Counts request timestamps over a fixed window and tells the caller how long
//! to wait once the window is full.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding window over request timestamps
#[derive(Debug)]
pub struct SlidingWindow {
    /// Window size
    window_size: Duration,
    /// Maximum requests per window
    limit: u32,
    /// Request timestamps, oldest first
    requests: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    /// Create a new window admitting `limit` requests per `window_size`
    pub fn new(window_size: Duration, limit: u32) -> Self {
        Self {
            window_size,
            limit: limit.max(1),
            requests: Mutex::new(VecDeque::new()),
        }
    }

    /// Window admitting `rpm` requests per minute
    pub fn per_minute(rpm: u32) -> Self {
        Self::new(Duration::from_secs(60), rpm)
    }

    /// Record a request if the window has room, otherwise return how long to wait
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut requests = self.requests.lock();

        // Remove old requests
        while let Some(&first) = requests.front() {
            if now.duration_since(first) >= self.window_size {
                requests.pop_front();
            } else {
                break;
            }
        }

        if (requests.len() as u32) < self.limit {
            requests.push_back(now);
            return Ok(());
        }

        let retry_after = requests
            .front()
            .map(|&first| self.window_size.saturating_sub(now.duration_since(first)))
            .unwrap_or(self.window_size);
        Err(retry_after.max(Duration::from_millis(1)))
    }

    /// Wait until the window admits one more request
    pub async fn acquire(&self) {
        while let Err(retry_after) = self.try_acquire() {
            tokio::time::sleep(retry_after).await;
        }
    }

    /// Requests still admissible in the current window
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let requests = self.requests.lock();
        let live = requests
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window_size)
            .count() as u32;
        self.limit.saturating_sub(live)
    }

    /// Configured limit
    pub fn limit(&self) -> u32 {
        self.limit
    }
}
