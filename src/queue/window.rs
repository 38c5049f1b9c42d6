//! Sliding window of task start times.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Fixed-capacity record of when recent tasks started.
///
/// Holds at most `capacity` instants, oldest first. Entries are only pruned
/// when [`ExecutionWindow::evict_expired`] is called.
#[derive(Debug, Clone)]
pub struct ExecutionWindow {
    timestamps: VecDeque<Instant>,
    capacity: usize,
    interval: Duration,
}

impl ExecutionWindow {
    /// Create a window allowing `capacity` starts per `interval`.
    pub fn new(capacity: usize, interval: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(capacity),
            capacity,
            interval,
        }
    }

    /// Drop every start that is at least one interval old at `now`.
    pub fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) < self.interval {
                break;
            }
            self.timestamps.pop_front();
        }
    }

    /// Record a task start.
    ///
    /// Callers must check [`ExecutionWindow::remaining`] first; a full window
    /// drops its oldest entry to keep the capacity bound.
    pub fn record(&mut self, at: Instant) {
        debug_assert!(self.timestamps.len() < self.capacity, "execution window overflow");
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(at);
    }

    /// Number of starts still allowed in the current window.
    pub fn remaining(&self) -> usize {
        self.capacity - self.timestamps.len()
    }

    /// Instant at which the oldest recorded start leaves the window.
    pub fn next_release(&self) -> Option<Instant> {
        self.timestamps.front().map(|oldest| *oldest + self.interval)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
