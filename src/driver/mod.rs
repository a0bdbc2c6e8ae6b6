// src/driver/mod.rs

//! Test drivers: the pluggable strategies that turn one test specification
//! into fragments of the shared dependency graph.
//!
//! A driver owns a [`DriverContext`] holding the test's name, its resolved
//! environment and a private FIFO [`ResultQueue`]. Fragment bodies push
//! results into that queue; the orchestrator drains it when it collects each
//! fragment. Nothing else is shared between drivers.
//!
//! - [`registry`] maps driver names to constructors; the table is passed to
//!   the orchestrator explicitly.
//! - [`shell`] is the built-in driver running one shell command per test.

pub mod registry;
pub mod shell;

use std::collections::VecDeque;
use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::dag::GraphError;
use crate::engine::fragment::{FragmentError, FragmentGraph, FragmentSpec, FragmentValue, PreviousValues};
use crate::result::TestResult;

pub use registry::{DriverConstructor, DriverRegistry};

/// Per-test configuration mapping, as loaded from the test specification
/// and completed with the injected fields.
pub type TestEnv = toml::Table;

/// Settings shared by every driver of a run.
#[derive(Debug, Clone, Default)]
pub struct GlobalEnv {
    pub root_dir: PathBuf,
    pub test_dir: PathBuf,
    pub output_dir: PathBuf,
    pub working_dir: PathBuf,
    pub show_error_output: bool,
    pub enable_colors: bool,
    /// Free-form values from the suite config's `[env]` table.
    pub vars: toml::Table,
}

impl GlobalEnv {
    /// Flatten into a table, as exposed to control-rule conditions.
    pub fn to_table(&self) -> toml::Table {
        let mut table = self.vars.clone();
        let path = |p: &PathBuf| toml::Value::String(p.display().to_string());
        table.insert("root_dir".to_string(), path(&self.root_dir));
        table.insert("test_dir".to_string(), path(&self.test_dir));
        table.insert("output_dir".to_string(), path(&self.output_dir));
        table.insert("working_dir".to_string(), path(&self.working_dir));
        table.insert(
            "show_error_output".to_string(),
            toml::Value::Boolean(self.show_error_output),
        );
        table
    }
}

/// Where a result was pushed from, kept to diagnose duplicate pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOrigin {
    pub location: &'static Location<'static>,
    pub thread: Option<String>,
}

impl PushOrigin {
    #[track_caller]
    pub fn here() -> Self {
        Self {
            location: Location::caller(),
            thread: std::thread::current().name().map(str::to_string),
        }
    }
}

impl fmt::Display for PushOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if let Some(thread) = &self.thread {
            write!(f, " (thread {thread})")?;
        }
        Ok(())
    }
}

/// FIFO of results pushed by one driver's fragments.
#[derive(Debug, Default)]
pub struct ResultQueue {
    inner: Mutex<VecDeque<(TestResult, PushOrigin)>>,
}

impl ResultQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    pub fn push(&self, result: TestResult) {
        let origin = PushOrigin::here();
        self.lock().push_back((result, origin));
    }

    pub fn pop(&self) -> Option<(TestResult, PushOrigin)> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(TestResult, PushOrigin)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State every driver carries: identity, environments and result queue.
#[derive(Debug)]
pub struct DriverContext {
    test_name: String,
    test_env: TestEnv,
    global_env: Arc<GlobalEnv>,
    results: ResultQueue,
}

impl DriverContext {
    /// Build a context; the test name is read from the `test_name` field the
    /// orchestrator injects into every test env.
    pub fn new(global_env: Arc<GlobalEnv>, test_env: TestEnv) -> anyhow::Result<Arc<Self>> {
        let test_name = test_env
            .get("test_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("test env has no string `test_name` field"))?
            .to_string();
        Ok(Arc::new(Self {
            test_name,
            test_env,
            global_env,
            results: ResultQueue::new(),
        }))
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn test_env(&self) -> &TestEnv {
        &self.test_env
    }

    pub fn global_env(&self) -> &GlobalEnv {
        &self.global_env
    }

    pub fn results(&self) -> &ResultQueue {
        &self.results
    }

    /// Working directory assigned to this test.
    pub fn working_dir(&self) -> PathBuf {
        match self.test_env.get("working_dir").and_then(|v| v.as_str()) {
            Some(dir) => PathBuf::from(dir),
            None => self.global_env.working_dir.join(&self.test_name),
        }
    }

    /// Push a result for this test (or a derived name).
    #[track_caller]
    pub fn push_result(&self, result: TestResult) {
        self.results.push(result);
    }

    /// Global uid of a fragment of this test.
    pub fn fragment_uid(&self, name: &str) -> String {
        format!("{}.{}", self.test_name, name)
    }

    /// Add a fragment `name` to the graph, after the given sibling fragments
    /// of the same test.
    pub fn add_fragment<F>(
        self: &Arc<Self>,
        graph: &mut FragmentGraph,
        name: &str,
        after: &[&str],
        body: F,
    ) -> Result<String, GraphError>
    where
        F: Fn(&PreviousValues) -> Result<FragmentValue, FragmentError> + Send + Sync + 'static,
    {
        let predecessors = after.iter().map(|sibling| self.fragment_uid(sibling));
        self.add_fragment_after_uids(graph, name, predecessors, body)
    }

    /// Add a fragment whose predecessors are given as fully qualified uids,
    /// possibly belonging to other tests.
    pub fn add_fragment_after_uids<F, I, S>(
        self: &Arc<Self>,
        graph: &mut FragmentGraph,
        name: &str,
        predecessors: I,
        body: F,
    ) -> Result<String, GraphError>
    where
        F: Fn(&PreviousValues) -> Result<FragmentValue, FragmentError> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let uid = self.fragment_uid(name);
        graph.add_vertex(
            &uid,
            FragmentSpec::new(Arc::clone(self), body),
            predecessors,
        )?;
        Ok(uid)
    }
}

/// Capability set every driver provides.
///
/// Drivers are constructed by the [`DriverRegistry`] from the global env and
/// the test env, then asked once to contribute their fragments.
pub trait TestDriver: Send + Sync {
    fn context(&self) -> &Arc<DriverContext>;

    /// Contribute this test's fragments and edges to the shared graph.
    fn add_test(self: Arc<Self>, graph: &mut FragmentGraph) -> anyhow::Result<()>;

    fn test_name(&self) -> &str {
        self.context().test_name()
    }
}
