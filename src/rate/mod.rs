use crate::clock::{Clock, SystemClock};
use crate::models::VoteEvent;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

pub const DEFAULT_WINDOW_MS: i64 = 5000;

/// Trailing-window rate estimator, one event list per key.
///
/// Events are pruned lazily on every write and every read, so there is no
/// timer to drive. The window is fixed for the lifetime of the instance;
/// callers that need another window build another calculator.
pub struct RateCalculator<K = String> {
    window_ms: i64,
    clock: Arc<dyn Clock>,
    events: HashMap<K, VecDeque<VoteEvent>>,
}

impl<K: Eq + Hash + Clone> RateCalculator<K> {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_WINDOW_MS, Arc::new(SystemClock))
    }

    /// A window of zero or less falls back to the default window.
    pub fn with_clock(window_ms: i64, clock: Arc<dyn Clock>) -> Self {
        let window_ms = if window_ms > 0 { window_ms } else { DEFAULT_WINDOW_MS };
        Self {
            window_ms,
            clock,
            events: HashMap::new(),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn add_vote(&mut self, key: &K) {
        self.add_votes(key, 1);
    }

    /// Records `count` events for `key` at the current time. Non-positive counts are ignored.
    pub fn add_votes(&mut self, key: &K, count: i64) {
        if count <= 0 {
            return;
        }
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        let now = self.clock.now();
        let window_ms = self.window_ms;

        let events = self.events.entry(key.clone()).or_default();
        prune(events, now, window_ms);
        // A wall clock may step back; clamping keeps the list in time order.
        let time = events.back().map_or(now, |last| last.time.max(now));
        events.push_back(VoteEvent { time, count });
    }

    /// Events per second over the trailing window, rounded to one decimal.
    pub fn get_rate(&mut self, key: &K) -> f64 {
        let now = self.clock.now();
        let window_ms = self.window_ms;

        let Some(events) = self.events.get_mut(key) else {
            return 0.0;
        };
        prune(events, now, window_ms);
        if events.is_empty() {
            self.events.remove(key);
            return 0.0;
        }

        let sum: u64 = events.iter().map(|event| u64::from(event.count)).sum();
        let rate = sum as f64 / window_ms as f64 * 1000.0;
        (rate * 10.0).round() / 10.0
    }

    pub fn reset(&mut self) {
        self.events.clear();
    }
}

impl<K: Eq + Hash + Clone> Default for RateCalculator<K> {
    fn default() -> Self {
        Self::new()
    }
}

// Event times never decrease, so everything stale sits at the front.
fn prune(events: &mut VecDeque<VoteEvent>, now: chrono::DateTime<chrono::Utc>, window_ms: i64) {
    let window = chrono::Duration::milliseconds(window_ms);
    while let Some(oldest) = events.front() {
        if now - oldest.time > window {
            events.pop_front();
        } else {
            break;
        }
    }
}
