//! Drivers for exercising the orchestrator without spawning processes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;

use dagsuite::control::{ConditionEnv, TestControl};
use dagsuite::discovery::TestDiscovery;
use dagsuite::driver::{DriverContext, DriverRegistry, GlobalEnv, TestDriver, TestEnv};
use dagsuite::engine::{FragmentError, FragmentGraph, FragmentValue, SuiteHooks};
use dagsuite::result::{TestResult, TestStatus};

use crate::probe::Probe;

/// Driver scripted by its test env:
///
/// - `status` (default `"PASS"`) and `msg`: the result pushed by `run`
/// - `fail_with`: `run` returns an error with this message
/// - `panic_with`: `run` panics with this message
/// - `abort`: `run` aborts silently
/// - `push_twice`: the result is pushed twice
/// - `steps`: number of chained fragments before `run`
/// - `after`: fully qualified uids `run` also depends on
/// - `sleep_ms`: time `run` holds its token
/// - `control`: control rules, applied around `run`
pub struct ScriptedDriver {
    context: Arc<DriverContext>,
    probe: Arc<Probe>,
}

impl ScriptedDriver {
    pub const NAME: &'static str = "scripted";

    /// Registry with this driver (sharing `probe`) and the built-in ones.
    pub fn registry(probe: Arc<Probe>) -> DriverRegistry {
        DriverRegistry::with_builtin_drivers().with(Self::NAME, move |global, env| {
            let driver: Arc<dyn TestDriver> = Arc::new(ScriptedDriver {
                context: DriverContext::new(global, env)?,
                probe: Arc::clone(&probe),
            });
            Ok(driver)
        })
    }

    fn str_field(&self, key: &str) -> Option<String> {
        self.context
            .test_env()
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn run(&self) -> Result<FragmentValue, FragmentError> {
        let uid = self.context.fragment_uid("run");
        let control = TestControl::for_test(&self.context, ConditionEnv::new())
            .map_err(anyhow::Error::from)?;

        if control.skip {
            let mut result = TestResult::new(self.context.test_name(), control.skipped_status());
            if let Some(msg) = control.message {
                result = result.with_msg(msg);
            }
            self.context.push_result(result);
            return Ok(FragmentValue::none());
        }

        self.probe.enter(&uid);
        let sleep = self
            .context
            .test_env()
            .get("sleep_ms")
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        thread::sleep(Duration::from_millis(sleep as u64));
        self.probe.exit();

        if let Some(msg) = self.str_field("panic_with") {
            panic!("{msg}");
        }
        if let Some(msg) = self.str_field("fail_with") {
            return Err(FragmentError::Failed(anyhow!(msg)));
        }
        if self.context.test_env().get("abort").and_then(|v| v.as_bool()) == Some(true) {
            return Err(FragmentError::Abort);
        }

        let observed: TestStatus = self
            .str_field("status")
            .unwrap_or_else(|| "PASS".to_string())
            .parse()
            .map_err(|e: String| anyhow!(e))?;
        let mut result = TestResult::new(self.context.test_name(), control.correct(observed))
            .with_env(self.context.test_env().clone());
        if let Some(msg) = self.str_field("msg") {
            result = result.with_msg(msg);
        }

        if self.context.test_env().get("push_twice").and_then(|v| v.as_bool()) == Some(true) {
            self.context.push_result(result.clone());
        }
        self.context.push_result(result);
        Ok(FragmentValue::new(observed))
    }
}

impl TestDriver for ScriptedDriver {
    fn context(&self) -> &Arc<DriverContext> {
        &self.context
    }

    fn add_test(self: Arc<Self>, graph: &mut FragmentGraph) -> anyhow::Result<()> {
        let steps = self
            .context
            .test_env()
            .get("steps")
            .and_then(|v| v.as_integer())
            .unwrap_or(0);

        let mut previous: Option<String> = None;
        for i in 0..steps {
            let name = format!("step{i}");
            let after: Vec<&str> = previous.iter().map(String::as_str).collect();
            self.context
                .add_fragment(graph, &name, &after, move |_| Ok(FragmentValue::new(i)))?;
            previous = Some(name);
        }

        let mut predecessors: Vec<String> = previous
            .iter()
            .map(|p| self.context.fragment_uid(p))
            .collect();
        if let Some(toml::Value::Array(after)) = self.context.test_env().get("after") {
            predecessors.extend(after.iter().filter_map(|v| v.as_str()).map(str::to_string));
        }

        let driver = Arc::clone(&self);
        self.context
            .add_fragment_after_uids(graph, "run", predecessors, move |_| driver.run())?;
        Ok(())
    }
}

/// Driver whose contribution is an arbitrary closure.
pub struct FnDriver<F> {
    context: Arc<DriverContext>,
    add: F,
}

impl<F> FnDriver<F>
where
    F: Fn(&Arc<DriverContext>, &mut FragmentGraph) -> anyhow::Result<()> + Clone + Send + Sync + 'static,
{
    /// Register a driver named `name` whose `add_test` calls `add`.
    pub fn register(registry: DriverRegistry, name: &str, add: F) -> DriverRegistry {
        registry.with(name, move |global: Arc<GlobalEnv>, env: TestEnv| {
            let driver: Arc<dyn TestDriver> = Arc::new(FnDriver {
                context: DriverContext::new(global, env)?,
                add: add.clone(),
            });
            Ok(driver)
        })
    }
}

impl<F> TestDriver for FnDriver<F>
where
    F: Fn(&Arc<DriverContext>, &mut FragmentGraph) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn context(&self) -> &Arc<DriverContext> {
        &self.context
    }

    fn add_test(self: Arc<Self>, graph: &mut FragmentGraph) -> anyhow::Result<()> {
        (self.add)(&self.context, graph)
    }
}

/// Discovery returning a fixed list of spec files.
#[derive(Debug, Clone)]
pub struct StaticDiscovery(pub Vec<String>);

impl TestDiscovery for StaticDiscovery {
    fn discover(&self, _test_dir: &Path, _sublist: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// In-memory test specs keyed by spec file (e.g. `"a/test.toml"`).
///
/// Returns the discovery listing every spec and hooks loading them from
/// memory; a spec stored as `None` fails to load.
pub fn in_memory_suite(
    specs: BTreeMap<String, Option<TestEnv>>,
) -> (StaticDiscovery, SuiteHooks) {
    let discovery = StaticDiscovery(specs.keys().cloned().collect());
    let hooks = SuiteHooks {
        load_test_env: Arc::new(move |path: &Path| {
            let entry = specs
                .iter()
                .find(|(key, _)| path.ends_with(key.as_str()))
                .ok_or_else(|| anyhow!("no such spec: {}", path.display()))?;
            entry
                .1
                .clone()
                .ok_or_else(|| anyhow!("cannot parse {}", path.display()))
        }),
        ..SuiteHooks::default()
    };
    (discovery, hooks)
}
