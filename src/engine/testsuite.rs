// src/engine/testsuite.rs

//! The orchestrator: registers every discovered test into one graph, runs
//! it, and turns the collected results into artifacts.
//!
//! Per-suite customisation goes through [`SuiteHooks`] (plain function
//! values with defaults), the [`DriverRegistry`] and a [`TestDiscovery`]
//! strategy, all handed to [`Testsuite::new`] or its builders.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::config::{load_test_env, SuiteOptions};
use crate::discovery::{default_test_name, SpecFileDiscovery, TestDiscovery};
use crate::driver::{DriverRegistry, GlobalEnv, TestEnv};
use crate::engine::collector::{CollectSettings, Collector};
use crate::engine::fragment::FragmentGraph;
use crate::engine::runtime::Runtime;
use crate::engine::workspace::{setup_result_dir, WorkingDir};
use crate::errors::{DagsuiteError, Result};
use crate::report::environ::write_environ;
use crate::report::{write_xunit, FileResultSink, ResultSink, RunSummary};

pub type TestNameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type LoadTestEnvFn = Arc<dyn Fn(&Path) -> anyhow::Result<TestEnv> + Send + Sync>;
pub type SetUpFn = Arc<dyn Fn(&mut GlobalEnv) -> anyhow::Result<()> + Send + Sync>;
pub type TearDownFn = Arc<dyn Fn(&GlobalEnv) -> anyhow::Result<()> + Send + Sync>;
pub type WriteCommentFn = Arc<dyn Fn(&mut dyn Write, &RunSummary) -> io::Result<()> + Send + Sync>;

/// Overridable steps of a run.
#[derive(Clone)]
pub struct SuiteHooks {
    /// Spec file (relative to the test dir) -> test name.
    pub test_name: TestNameFn,
    /// Spec file (absolute) -> test env.
    pub load_test_env: LoadTestEnvFn,
    /// Runs once the directories exist, before discovery.
    pub set_up: SetUpFn,
    /// Runs after the graph was executed, even when it failed.
    pub tear_down: TearDownFn,
    /// Writes the `comment` artifact.
    pub write_comment: WriteCommentFn,
}

impl Default for SuiteHooks {
    fn default() -> Self {
        Self {
            test_name: Arc::new(default_test_name),
            load_test_env: Arc::new(load_test_env),
            set_up: Arc::new(|_| Ok(())),
            tear_down: Arc::new(|_| Ok(())),
            write_comment: Arc::new(|out, summary| out.write_all(summary.render(false).as_bytes())),
        }
    }
}

impl fmt::Debug for SuiteHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteHooks").finish_non_exhaustive()
    }
}

/// Output of the registration phase.
#[derive(Debug, Default)]
pub struct Registration {
    pub graph: FragmentGraph,
    /// Spec files that registered successfully.
    pub tests: Vec<String>,
    /// Spec files whose registration failed.
    pub failures: Vec<String>,
}

pub struct Testsuite {
    options: SuiteOptions,
    registry: DriverRegistry,
    discovery: Box<dyn TestDiscovery>,
    hooks: SuiteHooks,
}

impl fmt::Debug for Testsuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Testsuite")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Testsuite {
    pub fn new(options: SuiteOptions, registry: DriverRegistry) -> Self {
        Self {
            options,
            registry,
            discovery: Box::new(SpecFileDiscovery::default()),
            hooks: SuiteHooks::default(),
        }
    }

    pub fn with_discovery(mut self, discovery: impl TestDiscovery + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    pub fn with_hooks(mut self, hooks: SuiteHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn options(&self) -> &SuiteOptions {
        &self.options
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Complete run: directories, registration, execution, artifacts and
    /// tear-down.
    pub async fn run(&self) -> Result<RunSummary> {
        let results_dir = setup_result_dir(&self.options.output_dir)?;
        if self.options.dump_environ {
            write_environ(&results_dir.join("environ.sh"), std::env::vars())?;
        }

        let working_dir = WorkingDir::provision(&self.options)?;
        let mut global = self.global_env(results_dir.clone(), working_dir.path());
        (self.hooks.set_up)(&mut global).context("suite set-up")?;
        let global = Arc::new(global);

        let outcome = self.run_in(&global, &results_dir).await;

        if let Err(err) = (self.hooks.tear_down)(&global) {
            warn!(error = %format!("{err:#}"), "suite tear-down failed");
        }
        working_dir.finish();

        let summary = outcome?;
        if let Some(path) = &self.options.xunit_output {
            write_xunit(path, &summary)?;
        }
        Ok(summary)
    }

    async fn run_in(&self, global: &Arc<GlobalEnv>, results_dir: &Path) -> Result<RunSummary> {
        let registration = self.register(global)?;
        fs::write(results_dir.join("tests.dot"), registration.graph.to_dot())?;

        let sink = FileResultSink::new(results_dir);
        let summary = self.execute(registration, Box::new(sink)).await?;

        for line in summary.render(self.options.enable_colors).lines() {
            info!("{line}");
        }
        self.write_comment(&results_dir.join("comment"), &summary)?;
        Ok(summary)
    }

    /// Global environment for this run's options.
    pub fn global_env(&self, output_dir: impl Into<std::path::PathBuf>, working_dir: &Path) -> GlobalEnv {
        GlobalEnv {
            root_dir: self.options.root_dir.clone(),
            test_dir: self.options.test_dir(),
            output_dir: output_dir.into(),
            working_dir: working_dir.to_path_buf(),
            show_error_output: self.options.show_error_output,
            enable_colors: self.options.enable_colors,
            vars: self.options.env.clone(),
        }
    }

    /// Discover tests and let each one contribute to a fresh graph.
    ///
    /// A test that fails to register is logged, rolled back out of the
    /// graph and listed in [`Registration::failures`]; the others are kept.
    pub fn register(&self, global: &Arc<GlobalEnv>) -> Result<Registration> {
        let specs = self
            .discovery
            .discover(&global.test_dir, &self.options.sublist)
            .context("test discovery")?;

        let mut registration = Registration::default();
        for spec in specs {
            let checkpoint = registration.graph.checkpoint();
            match self.parse_test(&mut registration.graph, global, &spec) {
                Ok(()) => registration.tests.push(spec),
                Err(err) => {
                    error!(test_case_file = %spec, error = %err, "cannot register test");
                    registration.graph.rollback(checkpoint);
                    registration.failures.push(spec);
                }
            }
        }

        info!(
            tests = registration.tests.len(),
            failures = registration.failures.len(),
            fragments = registration.graph.len(),
            "registration done"
        );
        Ok(registration)
    }

    /// Register one test: load its env, inject the computed fields, resolve
    /// and build its driver, and let it contribute fragments.
    pub fn parse_test(
        &self,
        graph: &mut FragmentGraph,
        global: &Arc<GlobalEnv>,
        test_case_file: &str,
    ) -> Result<()> {
        let test_name = (self.hooks.test_name)(test_case_file);
        let resolution = |reason: String| DagsuiteError::DriverResolution {
            test: test_name.clone(),
            reason,
        };

        let spec_path = global.test_dir.join(test_case_file);
        let mut test_env = (self.hooks.load_test_env)(&spec_path)
            .map_err(|err| resolution(format!("{err:#}")))?;

        let test_dir = spec_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| global.test_dir.clone());
        let working_dir = global.working_dir.join(&test_name);
        let text = |s: String| toml::Value::String(s);
        test_env.insert("test_dir".into(), text(test_dir.display().to_string()));
        test_env.insert("test_case_file".into(), text(test_case_file.to_string()));
        test_env.insert("test_name".into(), text(test_name.clone()));
        test_env.insert("working_dir".into(), text(working_dir.display().to_string()));

        let driver_name = match test_env.get("driver") {
            Some(toml::Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(resolution(format!(
                    "`driver` must be a string, got {}",
                    other.type_str()
                )));
            }
            None => self
                .options
                .default_driver
                .clone()
                .ok_or_else(|| resolution("no driver set and no default driver".to_string()))?,
        };

        let constructor = self
            .registry
            .get(&driver_name)
            .ok_or_else(|| resolution(format!("unknown driver '{driver_name}'")))?;

        let driver = constructor(Arc::clone(global), test_env)
            .map_err(|err| resolution(format!("cannot build driver '{driver_name}': {err:#}")))?;
        driver
            .add_test(graph)
            .map_err(|err| resolution(format!("driver '{driver_name}' failed to add test: {err:#}")))?;

        debug!(test = %test_name, driver = %driver_name, "test registered");
        Ok(())
    }

    /// Validate the graph, run every fragment and collect the results into
    /// `sink`.
    pub async fn execute(
        &self,
        registration: Registration,
        sink: Box<dyn ResultSink>,
    ) -> Result<RunSummary> {
        let sealed = registration.graph.seal()?;

        let mut collector = Collector::new(sink, self.collect_settings());
        let outcome = Runtime::new(sealed, self.options.jobs)
            .run(&mut collector)
            .await?;
        debug!(?outcome, "graph executed");

        Ok(collector.into_summary(&self.options.name, registration.failures))
    }

    /// Registration only: the tests and the graph a run would execute.
    pub fn dry_run(&self, global: &Arc<GlobalEnv>) -> Result<String> {
        let registration = self.register(global)?;
        registration.graph.validate()?;

        let mut out = format!("{} dry-run\n", self.options.name);
        out.push_str(&format!("tests ({}):\n", registration.tests.len()));
        for test in &registration.tests {
            out.push_str(&format!("  - {test}\n"));
        }
        if !registration.failures.is_empty() {
            out.push_str(&format!("failed to register ({}):\n", registration.failures.len()));
            for test in &registration.failures {
                out.push_str(&format!("  - {test}\n"));
            }
        }
        out.push('\n');
        out.push_str(&registration.graph.to_dot());
        Ok(out)
    }

    fn collect_settings(&self) -> CollectSettings {
        CollectSettings {
            max_consecutive_failures: self.options.max_consecutive_failures,
            show_error_output: self.options.show_error_output,
            enable_colors: self.options.enable_colors,
        }
    }

    fn write_comment(&self, path: &Path, summary: &RunSummary) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        (self.hooks.write_comment)(&mut out, summary)?;
        out.flush()?;
        Ok(())
    }
}
