//! jsrun
//!
//! Entry point for the script runtime. Parses CLI arguments, installs the
//! log subscriber and delegates to the Runtime for execution.

use clap::Parser as ClapParser;
use js_cli::{Cli, CliError, Runtime};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let Some(script) = cli.script.as_deref() else {
        eprintln!("Usage: jsrun <script.js>");
        return ExitCode::FAILURE;
    };

    let runtime = match Runtime::new(cli.runtime_config()) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.run_file(script) {
        Ok(stats) => {
            debug!(
                passes = stats.passes,
                timers = stats.timers,
                completions = stats.completions,
                callback_errors = stats.callback_errors,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(CliError::Read { path, source }) => {
            eprintln!("Error: Could not read file '{}': {}", path, source);
            ExitCode::FAILURE
        }
        Err(CliError::Uncaught(message)) => {
            eprintln!("Uncaught exception: {}", message);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
