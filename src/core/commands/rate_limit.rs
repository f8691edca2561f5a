use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window of accepted requests per user.
pub struct RateLimiter {
    per_minute: u32,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// `per_minute == 0` turns limiting off.
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    /// Records a hit for `user` and reports whether it fits in the window.
    /// Rejected attempts are not recorded.
    pub fn try_acquire(&self, user: &str) -> bool {
        self.try_acquire_at(user, Instant::now())
    }

    fn try_acquire_at(&self, user: &str, now: Instant) -> bool {
        if self.per_minute == 0 {
            return true;
        }
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Prunes every window; users left with none are dropped.
        hits.retain(|_, window| {
            while let Some(oldest) = window.front() {
                if now.duration_since(*oldest) >= WINDOW {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
        let window = hits.entry(user.to_string()).or_default();
        if window.len() >= self.per_minute as usize {
            return false;
        }
        window.push_back(now);
        true
    }
}
