//! Per-key rate limiter for outbound notifications.
//!
//! `has_changed(key)` answers "may I report this key again?": true the first
//! time a key is seen, then true again only once the configured interval has
//! passed since the last true answer. Entries are never evicted; the key
//! space is one entry per live node, bounded by cluster size.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;

pub struct ChangeMonitor {
    clock: Arc<dyn Clock>,
    interval: RwLock<Duration>,
    /// key → time of the last `true` answer.
    last_reported: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ChangeMonitor {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval: RwLock::new(interval),
            last_reported: Mutex::new(HashMap::new()),
        }
    }

    /// Change the minimum interval. Existing entries keep their timestamps.
    pub fn reconfigure(&self, interval: Duration) {
        *self.interval.write().unwrap_or_else(PoisonError::into_inner) = interval;
    }

    pub fn interval(&self) -> Duration {
        *self.interval.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true, and restarts the window for `key`, when the key has not
    /// been reported yet or its window has elapsed.
    ///
    /// The check and the reset happen under one lock, so two concurrent
    /// callers for the same key cannot both get `true`.
    pub fn has_changed(&self, key: &str) -> bool {
        let interval = self.interval();
        let now = self.clock.now();
        let mut last_reported = self
            .last_reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let due = match last_reported.get(key) {
            None => true,
            // A negative elapsed time (clock stepped back) is not due.
            Some(last) => (now - *last)
                .to_std()
                .map(|elapsed| elapsed >= interval)
                .unwrap_or(false),
        };
        if due {
            last_reported.insert(key.to_string(), now);
        }
        due
    }

    /// Number of keys ever reported.
    pub fn len(&self) -> usize {
        self.last_reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
