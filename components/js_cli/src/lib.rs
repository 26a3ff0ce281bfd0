//! Script Runtime CLI Library
//!
//! Binds the event loop and module loader from `async_runtime` to an
//! embedded QuickJS engine and exposes the [`Runtime`] used by `jsrun`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod engine;
pub mod error;
mod globals;
pub mod io;
pub mod runtime;

pub use cli::Cli;
pub use engine::QuickJsEngine;
pub use error::{CliError, CliResult};
pub use runtime::Runtime;
