//! Per-runtime scheduler state.
//!
//! A [`Scheduler`] owns the timer queue and the completion queue of one
//! runtime. It is shared (via `Rc`) between the installed script globals,
//! which schedule work, and the [`EventLoop`](crate::EventLoop), which
//! dispatches it. Everything here runs on the loop thread except the
//! completion producers, which only ever see a [`CompletionSender`] or a
//! [`CompletionSlot`].

use crate::clock::{Clock, MonotonicClock};
use crate::completion::{AsyncCompletion, CompletionQueue, CompletionSender, CompletionSlot};
use crate::config::RuntimeConfig;
use crate::timer_queue::{DeferredTask, TimerQueue};
use core_types::{RuntimeError, ScriptEngine, TimerId};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Timer and completion queues of one runtime instance.
///
/// # Examples
///
/// ```
/// use async_runtime::{RuntimeConfig, Scheduler};
/// use core_types::{MicrotaskStatus, ScriptEngine, ScriptException};
/// use std::time::Duration;
///
/// struct NullEngine;
///
/// impl ScriptEngine for NullEngine {
///     type Callback = ();
///     fn call(&self, _: ()) -> Result<(), ScriptException> { Ok(()) }
///     fn run_microtask(&self) -> Result<MicrotaskStatus, ScriptException> {
///         Ok(MicrotaskStatus::Exhausted)
///     }
/// }
///
/// let scheduler: Scheduler<NullEngine> = Scheduler::new(RuntimeConfig::default());
/// let id = scheduler.set_timeout((), Duration::from_millis(10)).unwrap();
/// assert!(!scheduler.is_quiescent());
///
/// scheduler.clear_timeout(id);
/// assert!(scheduler.is_quiescent());
/// ```
pub struct Scheduler<E: ScriptEngine> {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    timers: RefCell<TimerQueue<E::Callback>>,
    completions: CompletionQueue<E>,
}

impl<E: ScriptEngine> Scheduler<E> {
    /// Creates a scheduler on the process monotonic clock.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Creates a scheduler on a caller-supplied clock.
    pub fn with_clock(config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            timers: RefCell::new(TimerQueue::new(config.timer_capacity)),
            completions: CompletionQueue::new(config.completion_capacity),
            clock,
            config,
        }
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current monotonic time.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Schedules `callback` to run once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the timer queue is full. The callback is
    /// dropped and the event logged; the runtime carries on.
    pub fn set_timeout(
        &self,
        callback: E::Callback,
        delay: Duration,
    ) -> Result<TimerId, RuntimeError> {
        let now = self.clock.now();
        let result = self.timers.borrow_mut().schedule(callback, delay, now);
        match &result {
            Ok(id) => trace!(timer_id = %id, delay_ms = delay.as_millis() as u64, "timer scheduled"),
            Err(err) => warn!(kind = %err.kind, "dropping timer: {}", err.message),
        }
        result
    }

    /// Cancels a timer that has not fired yet. Unknown handles are ignored.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let removed = self.timers.borrow_mut().cancel(id);
        if removed {
            trace!(timer_id = %id, "timer cancelled");
        }
        removed
    }

    /// Removes the next timer due at `now` that was scheduled before
    /// `horizon`. The queue is not borrowed once this returns, so the
    /// callback may schedule or cancel timers.
    pub fn pop_due_timer(&self, now: Instant, horizon: u64) -> Option<DeferredTask<E::Callback>> {
        self.timers.borrow_mut().pop_due(now, horizon)
    }

    /// Sequence number the next scheduled timer will receive.
    pub fn timer_horizon(&self) -> u64 {
        self.timers.borrow().sequence_horizon()
    }

    /// Deadline of the earliest outstanding timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().next_deadline()
    }

    /// Number of outstanding timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// The completion queue.
    pub fn completions(&self) -> &CompletionQueue<E> {
        &self.completions
    }

    /// A producer handle for the completion queue.
    pub fn completion_sender(&self) -> CompletionSender<E> {
        self.completions.sender()
    }

    /// Enqueues a completion from the loop thread.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the completion queue is full.
    pub fn push_completion(&self, completion: AsyncCompletion<E>) -> Result<(), RuntimeError> {
        self.completions.push(completion)
    }

    /// Reserves room for a completion that another thread will deliver.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the completion queue is full.
    pub fn reserve_completion(&self) -> Result<CompletionSlot<E>, RuntimeError> {
        self.completions.reserve()
    }

    /// Drops every outstanding timer and queued completion.
    ///
    /// Engines call this before tearing down so no callback reference
    /// outlives the engine that owns it. Reservations held by producers are
    /// left alone; their completions are dropped when they arrive.
    pub fn clear(&self) {
        let capacity = self.config.timer_capacity;
        let timers = std::mem::replace(&mut *self.timers.borrow_mut(), TimerQueue::new(capacity));
        let completions = self.completions.take_all();
        debug!(
            timers = timers.len(),
            completions = completions.len(),
            "scheduler cleared"
        );
    }

    /// True when no timers and no completions (queued or reserved) remain.
    pub fn is_quiescent(&self) -> bool {
        self.timers.borrow().is_empty() && self.completions.is_idle()
    }
}

impl<E: ScriptEngine> fmt::Debug for Scheduler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("timers", &*self.timers.borrow())
            .field("completions", &self.completions)
            .finish()
    }
}
