//! Time-to-live cache for slow adapter queries

use std::time::{Duration, Instant};

/// One cached value with an expiry.
///
/// Callers pass `now` explicitly so expiry is testable without sleeping.
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Option<(T, Instant)>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value if it was stored less than `ttl` before `now`.
    pub fn get(&self, now: Instant) -> Option<T> {
        match &self.entry {
            Some((value, stored_at)) if now.saturating_duration_since(*stored_at) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn insert(&mut self, value: T, now: Instant) {
        self.entry = Some((value, now));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
