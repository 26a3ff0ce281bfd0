//! Deferred task (timer) queue.
//!
//! Tasks are keyed by `(deadline, sequence)`, so extraction order is
//! ascending deadline with FIFO order among equal deadlines. An id index makes
//! cancellation O(log n).

use core_types::{RuntimeError, TimerId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Largest handle handed out. Handles stay within the positive `i32` range
/// so scripts can pass them through integer conversion unchanged.
const MAX_TIMER_ID: u32 = i32::MAX as u32;

type TaskKey = (Instant, u64);

/// A callback waiting for its deadline.
pub struct DeferredTask<C> {
    /// Handle returned to the scheduler of this task
    pub id: TimerId,
    /// Monotonic instant at which the task becomes eligible to fire
    pub deadline: Instant,
    /// Insertion counter used to break deadline ties
    pub sequence: u64,
    callback: C,
}

impl<C> DeferredTask<C> {
    /// Borrows the stored callback.
    pub fn callback(&self) -> &C {
        &self.callback
    }

    /// Consumes the task, yielding its callback.
    pub fn into_callback(self) -> C {
        self.callback
    }
}

impl<C> fmt::Debug for DeferredTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// A bounded queue of deferred tasks.
///
/// # Examples
///
/// ```
/// use async_runtime::TimerQueue;
/// use std::time::{Duration, Instant};
///
/// let mut queue = TimerQueue::new(8);
/// let now = Instant::now();
/// let late = queue.schedule("late", Duration::from_millis(10), now).unwrap();
/// queue.schedule("early", Duration::from_millis(5), now).unwrap();
///
/// queue.cancel(late);
///
/// let fired: Vec<_> = queue
///     .due(now + Duration::from_millis(20))
///     .into_iter()
///     .map(|task| task.into_callback())
///     .collect();
/// assert_eq!(fired, vec!["early"]);
/// ```
pub struct TimerQueue<C> {
    tasks: BTreeMap<TaskKey, DeferredTask<C>>,
    index: HashMap<TimerId, TaskKey>,
    capacity: usize,
    next_id: u32,
    next_sequence: u64,
}

impl<C> TimerQueue<C> {
    /// Creates an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: BTreeMap::new(),
            index: HashMap::new(),
            capacity,
            next_id: 1,
            next_sequence: 0,
        }
    }

    /// Schedules `callback` to become due `delay` after `now`.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the queue already holds `capacity` tasks, and
    /// `InvalidArgument` when the deadline is not representable. The callback
    /// is dropped in both cases.
    pub fn schedule(
        &mut self,
        callback: C,
        delay: Duration,
        now: Instant,
    ) -> Result<TimerId, RuntimeError> {
        if self.tasks.len() >= self.capacity {
            return Err(RuntimeError::capacity_exceeded(format!(
                "timer queue is full ({} tasks)",
                self.capacity
            )));
        }
        let deadline = now.checked_add(delay).ok_or_else(|| {
            RuntimeError::invalid_argument(format!("timer delay {delay:?} is out of range"))
        })?;

        let id = self.allocate_id();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let key = (deadline, sequence);
        self.index.insert(id, key);
        self.tasks.insert(
            key,
            DeferredTask {
                id,
                deadline,
                sequence,
                callback,
            },
        );
        Ok(id)
    }

    /// Removes a task that has not fired yet.
    ///
    /// Unknown handles are ignored. Returns whether a task was removed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.index.remove(&id) {
            Some(key) => self.tasks.remove(&key).is_some(),
            None => false,
        }
    }

    /// Removes and returns every task whose deadline is at or before `now`,
    /// earliest deadline first, FIFO among equal deadlines.
    pub fn due(&mut self, now: Instant) -> Vec<DeferredTask<C>> {
        let mut fired = Vec::new();
        while let Some(task) = self.pop_due(now, u64::MAX) {
            fired.push(task);
        }
        fired
    }

    /// Removes the earliest task that is due at `now` and was scheduled with
    /// a sequence number below `horizon`.
    ///
    /// The event loop fires timers one at a time through this so that a
    /// callback cancelling a later timer of the same batch is honoured, and
    /// tasks scheduled during the batch wait for the next pass.
    pub fn pop_due(&mut self, now: Instant, horizon: u64) -> Option<DeferredTask<C>> {
        let entry = self.tasks.first_entry()?;
        let (deadline, sequence) = *entry.key();
        if deadline > now || sequence >= horizon {
            return None;
        }
        let task = entry.remove();
        self.index.remove(&task.id);
        Some(task)
    }

    /// Sequence number the next scheduled task will receive.
    pub fn sequence_horizon(&self) -> u64 {
        self.next_sequence
    }

    /// Deadline of the earliest outstanding task.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Returns true if `id` is outstanding.
    pub fn contains(&self, id: TimerId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of outstanding tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is outstanding.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Maximum number of outstanding tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn allocate_id(&mut self) -> TimerId {
        loop {
            let id = TimerId::new(self.next_id);
            self.next_id = if self.next_id >= MAX_TIMER_ID {
                1
            } else {
                self.next_id + 1
            };
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }
}

impl<C> fmt::Debug for TimerQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("len", &self.tasks.len())
            .field("capacity", &self.capacity)
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}
