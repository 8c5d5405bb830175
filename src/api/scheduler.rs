use std::hash::Hash;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

/// Queue a scheduled task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskQueue {
    /// Delayed; re-scheduling the same key restarts the delay.
    Timer,
    /// Next animation frame; keys are deduplicated.
    Frame,
    /// After frame work, when the host is idle.
    Idle,
}

/// Cooperative task scheduler driven by a host-advanced virtual clock.
///
/// Tasks are keys; the owner decides what a key means when it becomes due.
/// Re-entry with a pending key cancels the earlier request.
#[derive(Debug)]
pub struct Scheduler<K: Eq + Hash + Clone> {
    now: Duration,
    timers: IndexMap<K, Duration>,
    frame: IndexSet<K>,
    idle: IndexSet<K>,
    cancelled: u64,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> Scheduler<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            timers: IndexMap::new(),
            frame: IndexSet::new(),
            idle: IndexSet::new(),
            cancelled: 0,
        }
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Runs `key` after `delay`, cancelling a pending run of the same key.
    /// Returns `true` when an earlier request was cancelled.
    pub fn debounce(&mut self, key: K, delay: Duration) -> bool {
        let due = self.now + delay;
        let replaced = self.timers.shift_remove(&key).is_some();
        if replaced {
            self.cancelled = self.cancelled.saturating_add(1);
            trace!(task = ?key, "debounced task restarted");
        }
        self.timers.insert(key, due);
        replaced
    }

    /// Queues `key` for the next frame. Returns `false` when already queued.
    pub fn schedule(&mut self, key: K) -> bool {
        self.frame.insert(key)
    }

    /// Queues `key` for idle time. Returns `false` when already queued.
    pub fn schedule_idle(&mut self, key: K) -> bool {
        self.idle.insert(key)
    }

    /// Removes `key` from every queue. Returns `true` when something was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        let removed = self.timers.shift_remove(key).is_some()
            | self.frame.shift_remove(key)
            | self.idle.shift_remove(key);
        if removed {
            self.cancelled = self.cancelled.saturating_add(1);
        }
        removed
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.contains_key(key) || self.frame.contains(key) || self.idle.contains(key)
    }

    #[must_use]
    pub fn queue_of(&self, key: &K) -> Option<TaskQueue> {
        if self.timers.contains_key(key) {
            Some(TaskQueue::Timer)
        } else if self.frame.contains(key) {
            Some(TaskQueue::Frame)
        } else if self.idle.contains(key) {
            Some(TaskQueue::Idle)
        } else {
            None
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.len() + self.frame.len() + self.idle.len()
    }

    #[must_use]
    pub fn cancelled_count(&self) -> u64 {
        self.cancelled
    }

    /// Moves the clock forward and pops timers that became due, earliest first.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<K> {
        self.now += elapsed;
        let now = self.now;
        let mut due: Vec<(K, Duration)> = Vec::new();
        self.timers.retain(|key, at| {
            if *at <= now {
                due.push((key.clone(), *at));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(key, _)| key).collect()
    }

    /// Pops the frame queue in request order.
    pub fn take_frame(&mut self) -> Vec<K> {
        std::mem::take(&mut self.frame).into_iter().collect()
    }

    /// Pops the idle queue in request order.
    pub fn take_idle(&mut self) -> Vec<K> {
        std::mem::take(&mut self.idle).into_iter().collect()
    }

    /// Earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.values().min().copied()
    }
}
