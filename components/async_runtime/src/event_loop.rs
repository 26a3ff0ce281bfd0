//! Event loop implementation.
//!
//! The loop is a single-threaded poll/dispatch cycle over a [`Scheduler`]:
//!
//! 1. **Poll** - wait until a completion arrives or the next timer is due,
//!    never longer than [`RuntimeConfig::max_poll_wait`](crate::RuntimeConfig)
//! 2. **Dispatch** - deliver every queued completion, fire every due timer,
//!    then drain the engine's microtask queue to exhaustion
//!
//! The cycle repeats until, right after a dispatch pass, no timer and no
//! completion (queued or reserved) remains.

use crate::scheduler::Scheduler;
use core_types::{ErrorKind, MicrotaskStatus, ScriptEngine};
use std::fmt;
use std::ops::AddAssign;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, trace};

/// What one dispatch pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Completions delivered
    pub completions: usize,
    /// Timers fired
    pub timers: usize,
    /// Microtasks run
    pub microtasks: usize,
    /// Callbacks (of any kind) that threw
    pub callback_errors: usize,
}

/// Totals over a whole [`EventLoop::run_until_done`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Dispatch passes performed
    pub passes: usize,
    /// Completions delivered
    pub completions: usize,
    /// Timers fired
    pub timers: usize,
    /// Microtasks run, including the drain before the first pass
    pub microtasks: usize,
    /// Callbacks (of any kind) that threw
    pub callback_errors: usize,
}

impl AddAssign<PassReport> for LoopStats {
    fn add_assign(&mut self, pass: PassReport) {
        self.completions += pass.completions;
        self.timers += pass.timers;
        self.microtasks += pass.microtasks;
        self.callback_errors += pass.callback_errors;
    }
}

/// Drives one runtime's scheduler against a scripting engine.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, RuntimeConfig, Scheduler};
/// use core_types::{MicrotaskStatus, ScriptEngine, ScriptException};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// struct Counter {
///     fired: Cell<u32>,
/// }
///
/// impl ScriptEngine for Counter {
///     type Callback = u32;
///     fn call(&self, n: u32) -> Result<(), ScriptException> {
///         self.fired.set(self.fired.get() + n);
///         Ok(())
///     }
///     fn run_microtask(&self) -> Result<MicrotaskStatus, ScriptException> {
///         Ok(MicrotaskStatus::Exhausted)
///     }
/// }
///
/// let scheduler = Rc::new(Scheduler::new(RuntimeConfig::default()));
/// scheduler.set_timeout(2, Duration::ZERO).unwrap();
///
/// let engine = Counter { fired: Cell::new(0) };
/// let stats = EventLoop::new(scheduler).run_until_done(&engine);
///
/// assert_eq!(engine.fired.get(), 2);
/// assert_eq!(stats.passes, 1);
/// ```
pub struct EventLoop<E: ScriptEngine> {
    scheduler: Rc<Scheduler<E>>,
}

impl<E: ScriptEngine> EventLoop<E> {
    /// Creates a loop over `scheduler`.
    pub fn new(scheduler: Rc<Scheduler<E>>) -> Self {
        Self { scheduler }
    }

    /// The scheduler this loop dispatches.
    pub fn scheduler(&self) -> &Rc<Scheduler<E>> {
        &self.scheduler
    }

    /// Runs until quiescent.
    ///
    /// Microtasks left behind by code that ran before the loop are drained
    /// first. If nothing is outstanding after that, no pass runs at all.
    pub fn run_until_done(&self, engine: &E) -> LoopStats {
        let mut stats = LoopStats::default();
        stats += self.run_all_microtasks(engine);

        while !self.scheduler.is_quiescent() {
            stats += self.process_one_cycle(engine);
            stats.passes += 1;
        }

        debug!(
            passes = stats.passes,
            timers = stats.timers,
            completions = stats.completions,
            microtasks = stats.microtasks,
            callback_errors = stats.callback_errors,
            "event loop quiescent"
        );
        stats
    }

    /// Processes one complete cycle: poll, then dispatch.
    pub fn process_one_cycle(&self, engine: &E) -> PassReport {
        self.poll();
        self.dispatch(engine)
    }

    /// Blocks until there is something to dispatch or the wait cap lapses.
    ///
    /// Returns true if a completion is pending.
    pub fn poll(&self) -> bool {
        let timeout = self.poll_timeout();
        trace!(timeout_us = timeout.as_micros() as u64, "polling");
        self.scheduler.completions().wait(timeout)
    }

    /// Runs one dispatch pass without waiting.
    ///
    /// Completions go first, then due timers in deadline order, then the
    /// microtask queue is drained. A callback that throws is logged and
    /// counted; it never stops the pass.
    pub fn dispatch(&self, engine: &E) -> PassReport {
        let mut report = PassReport::default();

        for completion in self.scheduler.completions().take_all() {
            let operation = completion.label();
            report.completions += 1;
            if let Err(exception) = completion.deliver(engine) {
                report.callback_errors += 1;
                error!(
                    kind = %ErrorKind::CallbackException,
                    operation,
                    "completion callback threw: {exception}"
                );
            }
        }

        // Timers scheduled by callbacks of this pass wait for the next one.
        let now = self.scheduler.now();
        let horizon = self.scheduler.timer_horizon();
        while let Some(task) = self.scheduler.pop_due_timer(now, horizon) {
            let timer_id = task.id;
            report.timers += 1;
            if let Err(exception) = engine.call(task.into_callback()) {
                report.callback_errors += 1;
                error!(
                    kind = %ErrorKind::CallbackException,
                    %timer_id,
                    "timer callback threw: {exception}"
                );
            }
        }

        let drained = self.run_all_microtasks(engine);
        report.microtasks = drained.microtasks;
        report.callback_errors += drained.callback_errors;

        trace!(
            completions = report.completions,
            timers = report.timers,
            microtasks = report.microtasks,
            "dispatch pass done"
        );
        report
    }

    /// Runs microtasks until the engine reports none pending.
    ///
    /// Microtasks queued while draining are run too.
    pub fn run_all_microtasks(&self, engine: &E) -> PassReport {
        let mut report = PassReport::default();
        loop {
            match engine.run_microtask() {
                Ok(MicrotaskStatus::Ran) => report.microtasks += 1,
                Ok(MicrotaskStatus::Exhausted) => break,
                Err(exception) => {
                    report.microtasks += 1;
                    report.callback_errors += 1;
                    error!(
                        kind = %ErrorKind::CallbackException,
                        "microtask threw: {exception}"
                    );
                }
            }
        }
        report
    }

    fn poll_timeout(&self) -> Duration {
        if self.scheduler.is_quiescent() {
            return Duration::ZERO;
        }
        let cap = self.scheduler.config().max_poll_wait;
        match self.scheduler.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(self.scheduler.now())
                .min(cap),
            None => cap,
        }
    }
}

impl<E: ScriptEngine> fmt::Debug for EventLoop<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
