// src/driver/shell.rs

//! Built-in `shell` driver.
//!
//! ```toml
//! driver = "shell"
//! cmd = "make check"
//! expected_exit = 0          # optional
//! output_matches = "^ok$"    # optional regex, searched in stdout+stderr
//! control = [["SKIP", "os == 'windows'", "needs a POSIX shell"]]
//! ```

use std::fs;
use std::process::{Command, Output};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use regex::Regex;
use tracing::{debug, info};

use crate::control::{condition_env, host_condition_env, ControlRule, TestControl};
use crate::driver::{DriverContext, GlobalEnv, TestDriver, TestEnv};
use crate::engine::fragment::{FragmentError, FragmentGraph, FragmentValue};
use crate::result::{TestResult, TestStatus};

/// Value handed to successors of the `run` fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug)]
pub struct ShellDriver {
    context: Arc<DriverContext>,
    command: String,
    expected_exit: i32,
    output_matches: Option<Regex>,
    rules: Vec<ControlRule>,
}

impl ShellDriver {
    pub const NAME: &'static str = "shell";

    /// Build the driver, validating the test env up front so that a bad
    /// spec fails registration rather than execution.
    pub fn new(global: Arc<GlobalEnv>, env: TestEnv) -> anyhow::Result<Arc<Self>> {
        let command = match env.get("cmd") {
            Some(toml::Value::String(cmd)) => cmd.clone(),
            Some(other) => bail!("`cmd` must be a string, got {}", other.type_str()),
            None => bail!("missing `cmd`"),
        };

        let expected_exit = match env.get("expected_exit") {
            Some(toml::Value::Integer(code)) => {
                i32::try_from(*code).map_err(|_| anyhow!("`expected_exit` out of range: {code}"))?
            }
            Some(other) => bail!("`expected_exit` must be an integer, got {}", other.type_str()),
            None => 0,
        };

        let output_matches = match env.get("output_matches") {
            Some(toml::Value::String(pattern)) => Some(
                Regex::new(pattern).with_context(|| format!("invalid `output_matches` regex {pattern:?}"))?,
            ),
            Some(other) => bail!("`output_matches` must be a string, got {}", other.type_str()),
            None => None,
        };

        let rules = match env.get("control") {
            Some(control) => ControlRule::parse_list(control)?,
            None => Vec::new(),
        };

        let context = DriverContext::new(global, env)?;
        Ok(Arc::new(Self {
            context,
            command,
            expected_exit,
            output_matches,
            rules,
        }))
    }

    fn run(&self) -> Result<FragmentValue, FragmentError> {
        let env = condition_env(&self.context, host_condition_env());
        let control = TestControl::interpret(&self.rules, &env).map_err(anyhow::Error::from)?;
        let test_name = self.context.test_name();

        if control.skip {
            debug!(test = %test_name, "skipped by control rule");
            let mut result = TestResult::new(test_name, control.skipped_status())
                .with_env(self.context.test_env().clone());
            if let Some(msg) = &control.message {
                result = result.with_msg(msg.clone());
            }
            self.context.push_result(result);
            return Ok(FragmentValue::none());
        }

        let working_dir = self.context.working_dir();
        fs::create_dir_all(&working_dir)
            .with_context(|| format!("creating working dir {}", working_dir.display()))?;

        info!(test = %test_name, cmd = %self.command, "running test command");
        let output = shell_command(&self.command)
            .current_dir(&working_dir)
            .env("TEST_NAME", test_name)
            .output()
            .with_context(|| format!("spawning `{}`", self.command))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let log = combined_output(&output);

        let mut failures = Vec::new();
        if exit_code != self.expected_exit {
            failures.push(format!(
                "exit code {exit_code} (expected {})",
                self.expected_exit
            ));
        }
        if let Some(re) = &self.output_matches {
            if !re.is_match(&log) {
                failures.push(format!("output does not match {:?}", re.as_str()));
            }
        }

        let observed = if failures.is_empty() {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        };
        let status = control.correct(observed);

        let mut result = TestResult::new(test_name, status)
            .with_log(log.clone())
            .with_env(self.context.test_env().clone());
        let msg = match (&control.message, failures.is_empty()) {
            (Some(msg), true) => Some(msg.clone()),
            (Some(msg), false) => Some(format!("{msg} ({})", failures.join(", "))),
            (None, false) => Some(failures.join(", ")),
            (None, true) => None,
        };
        if let Some(msg) = msg {
            result = result.with_msg(msg);
        }
        self.context.push_result(result);

        Ok(FragmentValue::new(ShellOutput {
            exit_code,
            output: log,
        }))
    }
}

impl TestDriver for ShellDriver {
    fn context(&self) -> &Arc<DriverContext> {
        &self.context
    }

    fn add_test(self: Arc<Self>, graph: &mut FragmentGraph) -> anyhow::Result<()> {
        let driver = Arc::clone(&self);
        self.context
            .add_fragment(graph, "run", &[], move |_| driver.run())?;
        Ok(())
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

fn combined_output(output: &Output) -> String {
    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&output.stderr));
    log
}
