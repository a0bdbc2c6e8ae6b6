// src/logging.rs

//! Logging setup for `dagsuite` using `tracing` + `tracing-subscriber`.
//!
//! Filter selection:
//! 1. `--log-level` CLI flag (if provided), applied to every target
//! 2. `DAGSUITE_LOG`, parsed as an `EnvFilter` directive list
//!    (e.g. `info` or `dagsuite::engine=debug,info`)
//! 3. `info`
//!
//! Logs, including the line printed for every collected result, go to
//! STDERR. STDOUT only carries the dry-run listing.

use std::io::IsTerminal;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "DAGSUITE_LOG";

/// Install the global subscriber. Call once, at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(directive(level)),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(colors_enabled())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("cannot install log subscriber: {err}"))?;

    Ok(())
}

/// Whether STDERR is a terminal, i.e. whether status colours are wanted.
pub fn colors_enabled() -> bool {
    std::io::stderr().is_terminal()
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
