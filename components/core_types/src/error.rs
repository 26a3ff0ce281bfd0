//! Runtime error taxonomy.
//!
//! Every failure the runtime reports falls into one [`ErrorKind`]. Queue
//! operations return a [`RuntimeError`]; values thrown by script code are
//! carried around as a [`ScriptException`] once they have been rendered to
//! text on the script thread.

use std::fmt;
use thiserror::Error;

/// The category of a runtime failure.
///
/// Only an uncaught exception from the top-level script is fatal. Every other
/// kind is either raised back into script code or contained at the event
/// loop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A bounded queue is full; the offending task or completion was dropped
    CapacityExceeded,
    /// Wrong arity or type passed to an installed global
    InvalidArgument,
    /// A module path could not be read
    ModuleNotFound,
    /// A module body failed to compile
    ModuleLoadError,
    /// A module body threw while executing
    ModuleExecutionError,
    /// A module required itself while it was still executing
    ModuleCycle,
    /// A timer or completion callback threw
    CallbackException,
}

impl ErrorKind {
    /// Returns the stable name of this kind, as used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CapacityExceeded => "CapacityExceeded",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::ModuleNotFound => "ModuleNotFound",
            ErrorKind::ModuleLoadError => "ModuleLoadError",
            ErrorKind::ModuleExecutionError => "ModuleExecutionError",
            ErrorKind::ModuleCycle => "ModuleCycle",
            ErrorKind::CallbackException => "CallbackException",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorized runtime failure.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, RuntimeError};
///
/// let error = RuntimeError::new(ErrorKind::InvalidArgument, "setTimeout expects a function");
/// assert_eq!(error.to_string(), "InvalidArgument: setTimeout expects a function");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// The category of the failure
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl RuntimeError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::CapacityExceeded`].
    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapacityExceeded, message)
    }

    /// Shorthand for [`ErrorKind::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }
}

/// A value thrown by script code, rendered to text on the script thread.
///
/// Engine values cannot leave the script thread, so callbacks report their
/// failures in this form. The loop logs it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ScriptException {
    /// Display string of the thrown value (message and stack when available)
    pub message: String,
}

impl ScriptException {
    /// Wraps the display text of a thrown value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
