//! Runtime orchestration for script execution
//!
//! The Runtime struct ties the QuickJS engine to the event loop:
//! - top-level evaluation of a script file or string
//! - running the loop until no timers or completions remain
//! - inspection helpers used by the CLI and the tests

use crate::engine::{describe_caught, display_string, eval_named, QuickJsEngine};
use crate::error::{CliError, CliResult};
use async_runtime::{EventLoop, LoopStats, RuntimeConfig};
use rquickjs::{CatchResultExt, Value};
use std::fmt;
use tracing::{debug, info};

/// One script runtime: engine, globals and event loop
pub struct Runtime {
    event_loop: EventLoop<QuickJsEngine>,
    engine: QuickJsEngine,
}

impl Runtime {
    /// Create a new runtime instance
    ///
    /// # Errors
    /// Returns `CliError` if the engine or the I/O worker cannot start
    ///
    /// # Example
    /// ```
    /// use async_runtime::RuntimeConfig;
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    /// runtime.execute_string("setTimeout(() => {}, 0);").unwrap();
    /// assert_eq!(runtime.run_event_loop().timers, 1);
    /// ```
    pub fn new(config: RuntimeConfig) -> CliResult<Self> {
        let engine = QuickJsEngine::new(config)?;
        let event_loop = EventLoop::new(engine.scheduler().clone());
        Ok(Self { event_loop, engine })
    }

    /// Execute a script file, then run the event loop to completion
    ///
    /// # Errors
    /// `CliError::Read` if the file cannot be read, `CliError::Uncaught` if
    /// top-level code throws. Exceptions thrown later by callbacks are
    /// logged and counted in the returned stats instead.
    ///
    /// # Example
    /// ```no_run
    /// use async_runtime::RuntimeConfig;
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
    /// let stats = runtime.run_file("example.js").unwrap();
    /// println!("{} passes", stats.passes);
    /// ```
    pub fn run_file(&self, path: &str) -> CliResult<LoopStats> {
        self.execute_file(path)?;
        Ok(self.run_event_loop())
    }

    /// Evaluate a script file's top level without running the loop
    ///
    /// # Errors
    /// Returns `CliError` if the file cannot be read or the top level throws
    pub fn execute_file(&self, path: &str) -> CliResult<()> {
        let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_string(),
            source,
        })?;
        info!(script = path, bytes = source.len(), "executing script");
        self.execute_source(&source, path)
    }

    /// Evaluate source at the top level without running the loop
    ///
    /// # Errors
    /// `CliError::Uncaught` if evaluation throws
    pub fn execute_string(&self, source: &str) -> CliResult<()> {
        self.execute_source(source, "<input>")
    }

    /// Evaluate source at the top level, naming it `filename` in stack traces
    ///
    /// # Errors
    /// `CliError::Uncaught` if evaluation throws
    pub fn execute_source(&self, source: &str, filename: &str) -> CliResult<()> {
        self.engine.context().with(|ctx| {
            eval_named::<()>(&ctx, source, filename)
                .catch(&ctx)
                .map_err(|caught| CliError::Uncaught(describe_caught(caught)))
        })
    }

    /// Evaluate an expression and return `String(result)`
    ///
    /// # Errors
    /// `CliError::Uncaught` if evaluation throws
    pub fn eval_to_string(&self, source: &str) -> CliResult<String> {
        self.engine.context().with(|ctx| {
            let value: Value = ctx
                .eval(source)
                .catch(&ctx)
                .map_err(|caught| CliError::Uncaught(describe_caught(caught)))?;
            Ok(display_string(&value))
        })
    }

    /// Run the event loop until quiescent
    pub fn run_event_loop(&self) -> LoopStats {
        let stats = self.event_loop.run_until_done(&self.engine);
        debug!(passes = stats.passes, "script finished");
        stats
    }

    /// Access the engine
    pub fn engine(&self) -> &QuickJsEngine {
        &self.engine
    }

    /// Identifiers of every module evaluated so far
    pub fn loaded_modules(&self) -> Vec<String> {
        self.engine.loaded_modules()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
