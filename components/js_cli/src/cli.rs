//! Command-line arguments

use async_runtime::config::{
    DEFAULT_COMPLETION_CAPACITY, DEFAULT_MAX_POLL_WAIT, DEFAULT_TIMER_CAPACITY,
};
use async_runtime::RuntimeConfig;
use clap::Parser;
use std::time::Duration;

/// Run a script file with timers, file I/O and CommonJS `require`.
#[derive(Parser, Debug)]
#[command(name = "jsrun")]
#[command(version = "0.1.0")]
#[command(about = "Run a JavaScript file on an embedded engine with an event loop", long_about = None)]
pub struct Cli {
    /// Script file to execute
    pub script: Option<String>,

    /// Maximum number of outstanding timers
    #[arg(long, default_value_t = DEFAULT_TIMER_CAPACITY)]
    pub max_timers: usize,

    /// Maximum number of queued or in-flight async completions
    #[arg(long, default_value_t = DEFAULT_COMPLETION_CAPACITY)]
    pub max_completions: usize,

    /// Upper bound on a single event-loop wait, in milliseconds
    #[arg(long, default_value_t = DEFAULT_MAX_POLL_WAIT.as_millis() as u64)]
    pub max_poll_wait_ms: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Builds the runtime configuration from the parsed flags.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::default()
            .with_timer_capacity(self.max_timers)
            .with_completion_capacity(self.max_completions)
            .with_max_poll_wait(Duration::from_millis(self.max_poll_wait_ms))
    }
}
