//! taskflow - task lifecycle engine CLI
//!
//! Tracks task status, dependencies, subtasks and assignees, and persists
//! every change optimistically with rollback on failure.

use clap::Parser;
use taskflow::cli::Cli;
use taskflow::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    init_tracing();

    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    let events_to_stdout = cli
        .events
        .as_deref()
        .is_some_and(|value| value.trim() == "-");
    // Event lines own stdout when `--events -` is set.
    let json = cli.json && !events_to_stdout;
    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}

/// Coordinator and file-store logs, filtered by RUST_LOG and written to
/// stderr. Silent when RUST_LOG is unset, empty, oversized or invalid.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty() && raw.len() <= 4096)
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}
