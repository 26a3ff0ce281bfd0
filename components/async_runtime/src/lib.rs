//! Async runtime for embedded script execution.
//!
//! This crate provides the scheduling and module machinery of a script
//! runtime, independent of any particular engine:
//! - Timer queue with deadline ordering and FIFO tie-break
//! - Async completion queue fed by background producers
//! - Event loop composing both queues with the engine's microtask drain
//! - CommonJS-style module loader with a single-evaluation cache
//!
//! # Overview
//!
//! - [`Scheduler`] - Timer and completion queues of one runtime
//! - [`EventLoop`] - Poll/dispatch cycle that runs until quiescent
//! - [`ModuleLoader`] - `require` resolution over a [`ModuleCache`]
//!
//! Engines plug in through [`core_types::ScriptEngine`] (for the loop) and
//! [`ModuleHost`] (for the loader).
//!
//! # Examples
//!
//! ## Event Loop Usage
//!
//! ```
//! use async_runtime::{EventLoop, RuntimeConfig, Scheduler};
//! use core_types::{MicrotaskStatus, ScriptEngine, ScriptException};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! struct Quiet;
//!
//! impl ScriptEngine for Quiet {
//!     type Callback = ();
//!     fn call(&self, _: ()) -> Result<(), ScriptException> { Ok(()) }
//!     fn run_microtask(&self) -> Result<MicrotaskStatus, ScriptException> {
//!         Ok(MicrotaskStatus::Exhausted)
//!     }
//! }
//!
//! let scheduler = Rc::new(Scheduler::new(RuntimeConfig::default()));
//! scheduler.set_timeout((), Duration::from_millis(1)).unwrap();
//!
//! let stats = EventLoop::new(scheduler.clone()).run_until_done(&Quiet);
//! assert_eq!(stats.timers, 1);
//! assert!(scheduler.is_quiescent());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod completion;
pub mod config;
pub mod event_loop;
pub mod module;
pub mod scheduler;
pub mod timer_queue;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use completion::{AsyncCompletion, CompletionQueue, CompletionSender, CompletionSlot};
pub use config::RuntimeConfig;
pub use event_loop::{EventLoop, LoopStats, PassReport};
pub use module::{wrap_module_source, ModuleCache, ModuleError, ModuleHost, ModuleLoader};
pub use scheduler::Scheduler;
pub use timer_queue::{DeferredTask, TimerQueue};
