//! The scripting engine seam used by the event loop.
//!
//! The event loop never sees engine values directly. It holds opaque
//! callback handles, hands them back to the engine to invoke, and asks the
//! engine to run one pending microtask at a time.

use crate::ScriptException;
use std::fmt;

/// Handle identifying an outstanding deferred task.
///
/// Handles are never zero and are unique among outstanding tasks. Scripts
/// see them as plain numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u32);

impl TimerId {
    /// Wraps a raw handle value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of asking the engine for one microtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrotaskStatus {
    /// A pending job ran to completion
    Ran,
    /// No job was pending
    Exhausted,
}

/// What the event loop needs from a scripting engine.
///
/// Implementations run on the loop thread only. A callback is consumed by
/// [`ScriptEngine::call`], so the engine releases its reference exactly once
/// whether or not the script function threw.
///
/// # Examples
///
/// ```
/// use core_types::{MicrotaskStatus, ScriptEngine, ScriptException};
/// use std::cell::RefCell;
///
/// struct Recorder {
///     calls: RefCell<Vec<&'static str>>,
/// }
///
/// impl ScriptEngine for Recorder {
///     type Callback = &'static str;
///
///     fn call(&self, callback: Self::Callback) -> Result<(), ScriptException> {
///         self.calls.borrow_mut().push(callback);
///         Ok(())
///     }
///
///     fn run_microtask(&self) -> Result<MicrotaskStatus, ScriptException> {
///         Ok(MicrotaskStatus::Exhausted)
///     }
/// }
///
/// let engine = Recorder { calls: RefCell::new(vec![]) };
/// engine.call("tick").unwrap();
/// assert_eq!(*engine.calls.borrow(), vec!["tick"]);
/// ```
pub trait ScriptEngine {
    /// Owned reference to a script function scheduled for later invocation.
    type Callback;

    /// Invokes a script callback with no arguments, consuming the reference.
    ///
    /// A thrown value is returned as its display text.
    fn call(&self, callback: Self::Callback) -> Result<(), ScriptException>;

    /// Runs at most one pending microtask (e.g. a promise reaction).
    fn run_microtask(&self) -> Result<MicrotaskStatus, ScriptException>;
}
