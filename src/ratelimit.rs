use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Throttle parameters as declared in the source catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_ms: u64,
}

/// Fixed-window outbound throttle, one instance per source. Denied callers
/// skip the cycle and wait for the next scheduled tick; requests are never
/// queued.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> RateLimiter {
        RateLimiter {
            max_requests: limit.max_requests,
            window: Duration::from_millis(limit.window_ms),
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Grants at most `max_requests` acquisitions per window.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.used = 0;
        }
        if state.used < self.max_requests {
            state.used += 1;
            true
        } else {
            false
        }
    }
}
