// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod dag;
pub mod discovery;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod report;
pub mod result;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::{SuiteConfig, SuiteOptions};
use crate::config::validate::validate_jobs_override;
use crate::driver::DriverRegistry;
use crate::engine::Testsuite;

/// High-level entry point used by `main.rs`; returns the process exit code.
///
/// This wires together:
/// - suite config loading and CLI overrides
/// - the driver registry (built-in drivers)
/// - the orchestrator, or the dry-run listing
pub async fn run(args: CliArgs) -> Result<i32> {
    let (config, config_path) = load_suite_config(args.config.as_deref())?;
    let options = resolve_options(&args, &config, config_path.as_deref())?;
    let fail_on_test_failure = options.fail_on_test_failure;

    let suite = Testsuite::new(options, DriverRegistry::with_builtin_drivers());
    debug!(?suite, "testsuite configured");

    if args.dry_run {
        let options = suite.options();
        let working_dir = options.dev_temp.clone().unwrap_or_else(|| options.temp_dir.clone());
        let global = Arc::new(suite.global_env(options.results_dir(), &working_dir));
        println!("{}", suite.dry_run(&global)?);
        return Ok(0);
    }

    let summary = suite.run().await?;
    let code = summary.exit_code(fail_on_test_failure);
    info!(exit_code = code, "testsuite finished");
    Ok(code)
}

/// Load the suite config named on the CLI, else `Testsuite.toml` when it
/// exists, else use defaults.
pub fn load_suite_config(path: Option<&Path>) -> Result<(SuiteConfig, Option<PathBuf>)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = default_config_path();
            if !default.is_file() {
                debug!("no suite config file, using defaults");
                return Ok((SuiteConfig::default(), None));
            }
            default
        }
    };

    let config = load_and_validate(&path)
        .with_context(|| format!("loading suite config {}", path.display()))?;
    info!(path = %path.display(), suite = %config.name, "suite config loaded");
    Ok((config, Some(path)))
}

/// Merge the suite config and the CLI into the options of a run. CLI
/// values win.
pub fn resolve_options(
    args: &CliArgs,
    config: &SuiteConfig,
    config_path: Option<&Path>,
) -> Result<SuiteOptions> {
    let mut options = SuiteOptions::from_config(config);

    let root_dir = match &args.root_dir {
        Some(dir) => dir.clone(),
        None => config_root_dir(config_path),
    };
    options.root_dir = std::path::absolute(&root_dir)
        .with_context(|| format!("resolving root dir {}", root_dir.display()))?;

    options.output_dir = args.output_dir.clone();
    if let Some(temp_dir) = &args.temp_dir {
        options.temp_dir = temp_dir.clone();
    }
    options.dev_temp = args.dev_temp.clone();
    if let Some(jobs) = args.jobs {
        options.jobs = validate_jobs_override(jobs)?;
    }
    if let Some(max) = args.max_consecutive_failures {
        options.max_consecutive_failures = max;
    }
    options.enable_cleanup = !args.disable_cleanup && args.dev_temp.is_none();
    options.show_error_output |= args.show_error_output;
    options.fail_on_test_failure |= args.fail_on_test_failure;
    options.dump_environ = args.dump_environ;
    options.xunit_output = args.xunit_output.clone();
    options.enable_colors = logging::colors_enabled();
    options.sublist = args.tests.clone();

    Ok(options)
}

/// The directory holding the config file, or `.` for a bare file name.
fn config_root_dir(config_path: Option<&Path>) -> PathBuf {
    match config_path.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
