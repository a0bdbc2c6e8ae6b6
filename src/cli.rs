// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagsuite`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagsuite",
    version,
    about = "Run dependency-linked test cases concurrently and report their outcomes.",
    long_about = None
)]
pub struct CliArgs {
    /// Suite config file (TOML).
    ///
    /// Default: `Testsuite.toml` in the current directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Testsuite root directory; the test subdir is resolved from here.
    ///
    /// Default: the directory containing the config file, else `.`.
    #[arg(long, value_name = "DIR")]
    pub root_dir: Option<PathBuf>,

    /// Output directory; results go to `<DIR>/new`, the previous run's to
    /// `<DIR>/old`.
    #[arg(short = 'o', long, value_name = "DIR", default_value = "out")]
    pub output_dir: PathBuf,

    /// Directory in which the per-run working directory is created.
    #[arg(short = 't', long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Use this fixed working directory (emptied first, never removed).
    /// Without a value, `tmp` is used.
    #[arg(
        short = 'd',
        long,
        value_name = "DIR",
        num_args = 0..=1,
        default_missing_value = "tmp"
    )]
    pub dev_temp: Option<PathBuf>,

    /// Maximum number of fragments running at the same time.
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Stop the run after more than N consecutive failures (0: never).
    #[arg(long, value_name = "N")]
    pub max_consecutive_failures: Option<usize>,

    /// Keep the working directory after the run.
    #[arg(long)]
    pub disable_cleanup: bool,

    /// Show the captured log of unexpected results.
    #[arg(short = 'E', long)]
    pub show_error_output: bool,

    /// Write the process environment to `environ.sh` in the output dir.
    #[arg(long)]
    pub dump_environ: bool,

    /// Also write an xUnit XML report to this file.
    #[arg(long, value_name = "FILE")]
    pub xunit_output: Option<PathBuf>,

    /// Exit with status 2 when a test fails or the run is aborted.
    #[arg(long)]
    pub fail_on_test_failure: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGSUITE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Register the tests and print the graph, but execute nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Tests to run: paths or regex prefixes relative to the test dir.
    #[arg(value_name = "TESTS")]
    pub tests: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
