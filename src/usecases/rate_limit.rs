use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Sliding-window counter keyed by customer identity, used to throttle the
/// payment-initiation path. Best-effort: under contention a racing pair of
/// checks may under- or over-count by one, which is acceptable for a
/// throttle that is not a security boundary.
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` and reports whether it is within the limit.
    pub fn check(&self, key: &str) -> bool {
        if self.max_per_window == 0 {
            return true;
        }

        let now = Instant::now();
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = self.window;
        // Drop identities whose hits have all aged out, or the map grows by
        // one entry per customer ever seen.
        hits.retain(|_, entry| {
            entry.retain(|hit| now.duration_since(*hit) < window);
            !entry.is_empty()
        });
        let entry = hits.entry(key.to_string()).or_default();

        if entry.len() >= self.max_per_window as usize {
            return false;
        }

        entry.push(now);
        true
    }
}
