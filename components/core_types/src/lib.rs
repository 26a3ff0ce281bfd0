//! Core types shared by the scheduler, the module loader and the engine binding.
//!
//! This crate holds the pieces every other component agrees on: the error
//! taxonomy, the text form of a thrown script value, and the narrow trait the
//! event loop uses to drive a scripting engine.
//!
//! # Overview
//!
//! - [`ErrorKind`] - Categories of runtime failures
//! - [`RuntimeError`] - A categorized failure with a message
//! - [`ScriptException`] - Display text of a value thrown by script code
//! - [`ScriptEngine`] - What the event loop needs from an engine
//! - [`TimerId`] - Handle returned by `setTimeout`
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, RuntimeError};
//!
//! let error = RuntimeError::capacity_exceeded("timer queue is full (256 tasks)");
//! assert_eq!(error.kind, ErrorKind::CapacityExceeded);
//! assert!(error.to_string().contains("timer queue is full"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod engine;
mod error;

pub use engine::{MicrotaskStatus, ScriptEngine, TimerId};
pub use error::{ErrorKind, RuntimeError, ScriptException};
