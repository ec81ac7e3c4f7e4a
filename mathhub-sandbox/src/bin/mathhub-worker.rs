//! Entry point for the `mathhub-worker` sandbox process.
//!
//! Reads requests from stdin and writes replies to stdout, one JSON document
//! per line. Logs go to stderr.

use std::io;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

/// Native stack of the engine thread. The parser recurses on nested input.
const ENGINE_STACK_BYTES: usize = 16 * 1024 * 1024;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let engine = std::thread::Builder::new()
        .name("mathhub-engine".to_owned())
        .stack_size(ENGINE_STACK_BYTES)
        .spawn(|| mathhub_sandbox::worker::serve(io::stdin().lock(), io::stdout().lock()));

    match engine.map(std::thread::JoinHandle::join) {
        Ok(Ok(Ok(()))) => ExitCode::SUCCESS,
        Ok(Ok(Err(e))) => {
            tracing::error!(error = %e, "worker I/O failed");
            ExitCode::FAILURE
        }
        Ok(Err(_)) => {
            tracing::error!("engine thread panicked");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot start engine thread");
            ExitCode::FAILURE
        }
    }
}
