// SPDX-License-Identifier: GPL-3.0-only

//! Bounded job queue for the producer/consumer paradigm
//!
//! A capture thread pushes raw records, a group of saver threads pops them.
//! The queue bounds memory when the savers fall behind: under
//! [`OverflowPolicy::Block`] the producer stalls, under the drop policies an
//! item is discarded instead.
//!
//! Shutdown must call [`BoundedJobQueue::wait`] before [`BoundedJobQueue::stop`].
//! Stopping first lets a consumer observe an empty stopped queue and exit while
//! the producer still has items in flight.

use crate::constants::queue::DROP_LOG_INTERVAL;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// What `push` does when the queue is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Block the producer until a consumer frees a slot
    #[default]
    Block,
    /// Evict the oldest buffered item to make room
    DropOldest,
    /// Discard the item being pushed
    DropNewest,
}

impl OverflowPolicy {
    /// Whether this policy ever discards data
    pub fn drops(&self) -> bool {
        !matches!(self, OverflowPolicy::Block)
    }
}

/// One unit of work popped from the queue
///
/// A job popped from a stopped, empty queue is invalid. That is the only
/// end-of-stream signal consumers see.
#[derive(Debug)]
pub struct Job<T> {
    data: Option<T>,
}

impl<T> Job<T> {
    fn valid(data: T) -> Self {
        Self { data: Some(data) }
    }

    fn invalid() -> Self {
        Self { data: None }
    }

    /// Check whether the job carries data
    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    /// Borrow the payload
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Mutably borrow the payload
    pub fn data_mut(&mut self) -> Option<&mut T> {
        self.data.as_mut()
    }

    /// Take the payload, `None` for the end-of-stream job
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Counters describing queue traffic since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items accepted into the buffer
    pub pushed: u64,
    /// Items handed to consumers
    pub popped: u64,
    /// Items discarded by the overflow policy or `clear()`
    pub dropped: u64,
    /// Push calls that had to wait for space
    pub stalled: u64,
}

struct State<T> {
    jobs: VecDeque<T>,
    stopped: bool,
    stats: QueueStats,
}

/// Thread-safe FIFO with a capacity bound, blocking push/pop and explicit stop
pub struct BoundedJobQueue<T> {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<State<T>>,
    // Mirror of `State::stopped` for lock-free reads
    stop: AtomicBool,
    space_available: Condvar,
    job_available: Condvar,
    drained: Condvar,
}

impl<T> BoundedJobQueue<T> {
    /// Create a blocking queue holding at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::Block)
    }

    /// Create a queue with an explicit overflow policy
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "job queue capacity must be at least 1");
        Self {
            capacity,
            policy,
            state: Mutex::new(State {
                jobs: VecDeque::new(),
                stopped: false,
                stats: QueueStats::default(),
            }),
            stop: AtomicBool::new(false),
            space_available: Condvar::new(),
            job_available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Create a queue without a capacity bound
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Maximum number of buffered items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy chosen at construction
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of pushed but not yet popped items
    ///
    /// The value is stale as soon as it is returned; use it for diagnostics only.
    pub fn size(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Whether the buffer is currently empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether `stop()` has been called
    pub fn is_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> QueueStats {
        self.state.lock().stats
    }

    /// Push an item, applying the overflow policy when full
    ///
    /// Returns `false` without inserting once the queue is stopped; callers
    /// treat that as "shutting down", not as a failure. Under a drop policy a
    /// discarded item still returns `true`.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }

        if state.jobs.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Block => {
                    state.stats.stalled += 1;
                    warn!(
                        capacity = self.capacity,
                        stalled = state.stats.stalled,
                        "Job queue full, producer blocked"
                    );
                    while state.jobs.len() >= self.capacity && !state.stopped {
                        self.space_available.wait(&mut state);
                    }
                    if state.stopped {
                        return false;
                    }
                }
                OverflowPolicy::DropOldest => {
                    state.jobs.pop_front();
                    self.record_drop(&mut state);
                }
                OverflowPolicy::DropNewest => {
                    self.record_drop(&mut state);
                    return true;
                }
            }
        }

        state.jobs.push_back(item);
        state.stats.pushed += 1;
        drop(state);

        self.job_available.notify_one();
        true
    }

    fn record_drop(&self, state: &mut State<T>) {
        state.stats.dropped += 1;
        let dropped = state.stats.dropped;
        if dropped == 1 || dropped % DROP_LOG_INTERVAL == 0 {
            warn!(
                capacity = self.capacity,
                policy = ?self.policy,
                dropped,
                "Job queue full, dropping data"
            );
        } else {
            debug!(policy = ?self.policy, dropped, "Dropped job");
        }
    }

    /// Pop the oldest item, blocking while the queue is empty and running
    ///
    /// After `stop()` the remaining items are still handed out; once the
    /// buffer is empty every call returns an invalid job immediately.
    pub fn pop(&self) -> Job<T> {
        let mut state = self.state.lock();
        while state.jobs.is_empty() && !state.stopped {
            self.job_available.wait(&mut state);
        }

        let Some(item) = state.jobs.pop_front() else {
            return Job::invalid();
        };
        state.stats.popped += 1;
        let now_empty = state.jobs.is_empty();
        drop(state);

        self.space_available.notify_one();
        if now_empty {
            self.drained.notify_all();
        }
        Job::valid(item)
    }

    /// Iterate over popped payloads until the end-of-stream job
    pub fn jobs(&self) -> Jobs<'_, T> {
        Jobs { queue: self }
    }

    /// Block until every buffered item has been popped
    ///
    /// Does not stop the queue.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.jobs.is_empty() {
            self.drained.wait(&mut state);
        }
    }

    /// Stop the queue and wake every blocked pusher and popper
    ///
    /// Idempotent. The stop flag is never reset.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            self.stop.store(true, Ordering::Release);
            debug!(pending = state.jobs.len(), "Job queue stopped");
        }
        self.job_available.notify_all();
        self.space_available.notify_all();
    }

    /// Discard every pending item
    pub fn clear(&self) {
        let discarded = {
            let mut state = self.state.lock();
            let discarded = std::mem::take(&mut state.jobs);
            state.stats.dropped += discarded.len() as u64;
            discarded
        };
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Cleared job queue");
        }
        drop(discarded);

        self.space_available.notify_all();
        self.drained.notify_all();
    }
}

impl<T> std::fmt::Debug for BoundedJobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedJobQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("size", &self.size())
            .field("stopped", &self.is_stop())
            .finish()
    }
}

/// Iterator returned by [`BoundedJobQueue::jobs`]
pub struct Jobs<'a, T> {
    queue: &'a BoundedJobQueue<T>,
}

impl<T> Iterator for Jobs<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop().into_data()
    }
}
