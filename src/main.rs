//! proai -- the Pro AI decision engine behind a line protocol.
//!
//! Reads commands from stdin and writes answers to stdout. Logs go to
//! stderr, filtered by `PROAI_LOG` (default `info`), so stdout carries
//! protocol lines only.

use std::io;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use proai::context::EngineConfig;
use proai::protocol::Session;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("PROAI_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut session = match Session::new(EngineConfig::default()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "engine failed to start");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if let Err(e) = session.run(stdin.lock(), &mut out) {
        error!(error = %e, "protocol i/o failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
