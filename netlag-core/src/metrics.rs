//! Bounded history of observed delays.
//!
//! Feeds chart-style collaborators: the history is ordered oldest to newest
//! and never grows past its capacity.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::DelayObserver;

/// Number of delays kept when no capacity is given.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Summary of the delays currently held in a history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayStats {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub last_ms: u64,
}

/// Capacity-bounded sequence of delays, oldest evicted first.
#[derive(Debug, Clone)]
pub struct DelayHistory {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl Default for DelayHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl DelayHistory {
    /// Creates an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a delay, evicting the oldest when full.
    pub fn push(&mut self, delay_ms: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(delay_ms);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Delays from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }

    /// Computes min, max, mean and latest; `None` when empty.
    pub fn stats(&self) -> Option<DelayStats> {
        let last_ms = *self.samples.back()?;
        let count = self.samples.len();
        let (min_ms, max_ms, total) = self.samples.iter().fold(
            (u64::MAX, 0u64, 0u128),
            |(min, max, total), &sample| {
                (min.min(sample), max.max(sample), total + u128::from(sample))
            },
        );

        Some(DelayStats {
            count,
            min_ms,
            max_ms,
            mean_ms: total as f64 / count as f64,
            last_ms,
        })
    }
}

/// Records delays into a shared history and notifies an optional observer.
pub struct MetricsSink {
    history: Mutex<DelayHistory>,
    observer: Option<Arc<dyn DelayObserver>>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, None)
    }
}

impl MetricsSink {
    pub fn new(capacity: usize, observer: Option<Arc<dyn DelayObserver>>) -> Self {
        Self {
            history: Mutex::new(DelayHistory::new(capacity)),
            observer,
        }
    }

    /// Appends a delay and notifies the observer.
    pub fn record(&self, delay_ms: u64) {
        self.history.lock().push(delay_ms);
        if let Some(observer) = &self.observer {
            observer.on_delay_recorded(delay_ms);
        }
    }

    /// Clears the history.
    pub fn reset(&self) {
        self.history.lock().clear();
    }

    /// Delays from oldest to newest.
    pub fn history(&self) -> Vec<u64> {
        self.history.lock().to_vec()
    }

    pub fn stats(&self) -> Option<DelayStats> {
        self.history.lock().stats()
    }

    pub fn capacity(&self) -> usize {
        self.history.lock().capacity()
    }
}
