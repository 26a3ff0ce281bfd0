//! Error types for the CLI

use std::io;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// The script file could not be read
    #[error("Could not read file '{path}': {source}")]
    Read {
        /// Path as given on the command line
        path: String,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// Top-level script code threw and nothing caught it
    #[error("Uncaught exception: {0}")]
    Uncaught(String),

    /// The engine itself failed (allocation, context setup)
    #[error("Engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    /// The background I/O worker could not be started
    #[error("I/O worker error: {0}")]
    Worker(#[from] io::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
