//! Runtime configuration.

use std::time::Duration;

/// Default bound on outstanding timers.
pub const DEFAULT_TIMER_CAPACITY: usize = 256;

/// Default bound on queued plus reserved async completions.
pub const DEFAULT_COMPLETION_CAPACITY: usize = 256;

/// Default upper bound on a single poll wait.
pub const DEFAULT_MAX_POLL_WAIT: Duration = Duration::from_millis(50);

/// Bounds and timing knobs for one runtime instance.
///
/// # Examples
///
/// ```
/// use async_runtime::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig::new()
///     .with_timer_capacity(16)
///     .with_max_poll_wait(Duration::from_millis(1));
/// assert_eq!(config.timer_capacity, 16);
/// assert_eq!(config.completion_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of outstanding timers
    pub timer_capacity: usize,
    /// Maximum number of queued plus reserved completions
    pub completion_capacity: usize,
    /// Longest the poll phase will block waiting for a completion
    pub max_poll_wait: Duration,
}

impl RuntimeConfig {
    /// Creates a configuration with default bounds.
    pub fn new() -> Self {
        Self {
            timer_capacity: DEFAULT_TIMER_CAPACITY,
            completion_capacity: DEFAULT_COMPLETION_CAPACITY,
            max_poll_wait: DEFAULT_MAX_POLL_WAIT,
        }
    }

    /// Sets the timer queue bound.
    pub fn with_timer_capacity(mut self, capacity: usize) -> Self {
        self.timer_capacity = capacity;
        self
    }

    /// Sets the completion queue bound.
    pub fn with_completion_capacity(mut self, capacity: usize) -> Self {
        self.completion_capacity = capacity;
        self
    }

    /// Sets the poll wait cap.
    pub fn with_max_poll_wait(mut self, wait: Duration) -> Self {
        self.max_poll_wait = wait;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}
