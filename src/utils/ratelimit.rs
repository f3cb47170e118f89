//! Sliding-window rate limiter for outbound API calls

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

pub struct SlidingWindowLimiter {
    name: &'static str,
    /// Request timestamps inside the current window
    request_times: Mutex<VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(name: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            name,
            request_times: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub fn per_second(name: &'static str, max_requests: usize) -> Self {
        Self::new(name, max_requests, Duration::from_secs(1))
    }

    /// Record a request if there is room and return zero, otherwise return how
    /// long the caller has to wait before asking again
    pub fn check_and_record(&self) -> Duration {
        let now = Instant::now();
        let mut request_times = match self.request_times.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        while let Some(&front) = request_times.front() {
            if now.duration_since(front) >= self.window {
                request_times.pop_front();
            } else {
                break;
            }
        }

        if request_times.len() >= self.max_requests {
            if let Some(&oldest) = request_times.front() {
                let elapsed = now.duration_since(oldest);
                if elapsed < self.window {
                    return self.window - elapsed;
                }
            }
        }

        request_times.push_back(now);
        Duration::ZERO
    }

    /// Wait until a request slot is free and take it
    pub async fn acquire(&self) {
        loop {
            let wait = self.check_and_record();
            if wait.is_zero() {
                return;
            }
            debug!("{} rate limit: waiting {}ms", self.name, wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}
