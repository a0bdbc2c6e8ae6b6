// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level suite configuration as read from a TOML file.
///
/// ```toml
/// [suite]
/// name = "mysuite"
/// test_subdir = "tests"
/// default_driver = "shell"
/// jobs = 4
/// max_consecutive_failures = 10
///
/// [env]
/// platform = "x86_64-linux"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSuiteConfig {
    #[serde(default)]
    pub suite: RawSuiteSection,

    /// Free-form values merged into the global environment.
    #[serde(default)]
    pub env: toml::Table,
}

/// `[suite]` section before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSuiteSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Directory holding the tests, relative to the root dir.
    #[serde(default)]
    pub test_subdir: Option<String>,

    /// Driver used by tests whose spec names none.
    #[serde(default)]
    pub default_driver: Option<String>,

    #[serde(default)]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub max_consecutive_failures: Option<usize>,

    #[serde(default)]
    pub show_error_output: Option<bool>,

    #[serde(default)]
    pub fail_on_test_failure: Option<bool>,
}

/// Validated suite configuration.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub name: String,
    pub test_subdir: String,
    pub default_driver: Option<String>,
    pub jobs: Option<usize>,
    pub max_consecutive_failures: usize,
    pub show_error_output: bool,
    pub fail_on_test_failure: bool,
    pub env: toml::Table,
}

impl SuiteConfig {
    /// Construct without running validation; used by `TryFrom`.
    pub(crate) fn new_unchecked(raw: RawSuiteConfig) -> Self {
        let suite = raw.suite;
        Self {
            name: suite.name.unwrap_or_else(default_suite_name),
            test_subdir: suite.test_subdir.unwrap_or_else(default_test_subdir),
            default_driver: suite.default_driver,
            jobs: suite.jobs,
            max_consecutive_failures: suite.max_consecutive_failures.unwrap_or(0),
            show_error_output: suite.show_error_output.unwrap_or(false),
            fail_on_test_failure: suite.fail_on_test_failure.unwrap_or(false),
            env: raw.env,
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self::new_unchecked(RawSuiteConfig::default())
    }
}

fn default_suite_name() -> String {
    "testsuite".to_string()
}

fn default_test_subdir() -> String {
    ".".to_string()
}

/// Fully resolved settings of one run: suite config overridden by the CLI.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub name: String,
    pub root_dir: PathBuf,
    /// Test directory, relative to `root_dir` unless absolute.
    pub test_subdir: String,
    /// Base output directory; results land in `<output_dir>/new`.
    pub output_dir: PathBuf,
    /// Parent of the per-run working directory.
    pub temp_dir: PathBuf,
    /// Fixed working directory, reused between runs and never removed.
    pub dev_temp: Option<PathBuf>,
    pub jobs: usize,
    /// 0 disables the circuit breaker.
    pub max_consecutive_failures: usize,
    pub enable_cleanup: bool,
    pub show_error_output: bool,
    pub enable_colors: bool,
    pub dump_environ: bool,
    pub xunit_output: Option<PathBuf>,
    pub fail_on_test_failure: bool,
    pub default_driver: Option<String>,
    pub env: toml::Table,
    /// Test selectors; empty runs everything.
    pub sublist: Vec<String>,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            name: default_suite_name(),
            root_dir: PathBuf::from("."),
            test_subdir: default_test_subdir(),
            output_dir: PathBuf::from("out"),
            temp_dir: std::env::temp_dir(),
            dev_temp: None,
            jobs: default_jobs(),
            max_consecutive_failures: 0,
            enable_cleanup: true,
            show_error_output: false,
            enable_colors: false,
            dump_environ: false,
            xunit_output: None,
            fail_on_test_failure: false,
            default_driver: None,
            env: toml::Table::new(),
            sublist: Vec::new(),
        }
    }
}

impl SuiteOptions {
    /// Options seeded from a validated suite config.
    pub fn from_config(config: &SuiteConfig) -> Self {
        Self {
            name: config.name.clone(),
            test_subdir: config.test_subdir.clone(),
            jobs: config.jobs.unwrap_or_else(default_jobs),
            max_consecutive_failures: config.max_consecutive_failures,
            show_error_output: config.show_error_output,
            fail_on_test_failure: config.fail_on_test_failure,
            default_driver: config.default_driver.clone(),
            env: config.env.clone(),
            ..Self::default()
        }
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root_dir.join(&self.test_subdir)
    }

    /// Directory receiving this run's artifacts.
    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join("new")
    }
}

/// Default worker budget: the number of available CPUs.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
