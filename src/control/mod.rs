// src/control/mod.rs

//! Per-test control rules: decide whether a test is skipped and whether its
//! outcome is expected to be a failure.
//!
//! A test's `control` entry is a list of rules, each a list of two or three
//! strings:
//!
//! ```toml
//! control = [
//!     ["SKIP", "env.platform == 'windows'", "no fork() there"],
//!     ["XFAIL", "'slow' in test.tags"],
//! ]
//! ```
//!
//! The whole list is validated (kinds, shapes and condition syntax) before
//! any condition is evaluated. Conditions are then evaluated in order and the
//! first one that holds selects the decision.

pub mod expr;

use std::str::FromStr;

use tracing::debug;

use crate::driver::DriverContext;
use crate::errors::{DagsuiteError, Result};
use crate::result::TestStatus;

pub use expr::{Condition, ConditionEnv, ExprError, Value, MAX_NESTING};

/// What a matching rule asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Run the test the regular way.
    None,
    /// Do not run the test; report it UNSUPPORTED.
    Skip,
    /// Run the test; PASS becomes XPASS and FAIL becomes XFAIL.
    XFail,
}

impl FromStr for ControlKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(ControlKind::None),
            "SKIP" => Ok(ControlKind::Skip),
            "XFAIL" => Ok(ControlKind::XFail),
            other => Err(format!("invalid kind: {other}")),
        }
    }
}

/// One validated `[kind, condition, message?]` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRule {
    pub kind: ControlKind,
    pub condition: Condition,
    pub message: Option<String>,
}

impl ControlRule {
    /// Validate a raw `control` value into rules, without evaluating any
    /// condition.
    pub fn parse_list(control: &toml::Value) -> Result<Vec<ControlRule>> {
        let toml::Value::Array(entries) = control else {
            return Err(DagsuiteError::ConfigError(
                "control: list expected at the top level".to_string(),
            ));
        };

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| Self::parse_entry(i + 1, entry))
            .collect()
    }

    fn parse_entry(index: usize, entry: &toml::Value) -> Result<ControlRule> {
        let defect = |reason: String| DagsuiteError::ControlRule { index, reason };

        let strings: Option<Vec<&str>> = match entry {
            toml::Value::Array(items) if matches!(items.len(), 2 | 3) => {
                items.iter().map(|v| v.as_str()).collect()
            }
            _ => None,
        };
        let Some(strings) = strings else {
            return Err(defect("list of 2 or 3 strings expected".to_string()));
        };

        let kind = ControlKind::from_str(strings[0]).map_err(|e| defect(e))?;
        let condition = Condition::parse(strings[1]).map_err(|e| {
            defect(format!("invalid condition ({}): {e}", e.kind()))
        })?;

        Ok(ControlRule {
            kind,
            condition,
            message: strings.get(2).map(|s| s.to_string()),
        })
    }
}

/// Decision taken for one test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestControl {
    pub skip: bool,
    pub xfail: bool,
    pub message: Option<String>,
}

impl TestControl {
    /// Pick the decision of the first rule whose condition holds in `env`.
    ///
    /// Rules after the matching one are not evaluated. Without a match the
    /// default decision (run normally, no message) is returned.
    pub fn interpret(rules: &[ControlRule], env: &ConditionEnv) -> Result<TestControl> {
        for (i, rule) in rules.iter().enumerate() {
            let holds = rule.condition.is_true(env).map_err(|e| DagsuiteError::ControlRule {
                index: i + 1,
                reason: format!("invalid condition ({}): {e}", e.kind()),
            })?;

            if holds {
                let (skip, xfail) = match rule.kind {
                    ControlKind::None => (false, false),
                    ControlKind::Skip => (true, false),
                    ControlKind::XFail => (false, true),
                };
                debug!(
                    rule = i + 1,
                    condition = rule.condition.source(),
                    skip,
                    xfail,
                    "control rule selected"
                );
                return Ok(TestControl {
                    skip,
                    xfail,
                    message: rule.message.clone(),
                });
            }
        }
        Ok(TestControl::default())
    }

    /// Validate then interpret a raw `control` value; `None` yields the
    /// default decision.
    pub fn from_value(control: Option<&toml::Value>, env: &ConditionEnv) -> Result<TestControl> {
        match control {
            Some(control) => {
                let rules = ControlRule::parse_list(control)?;
                Self::interpret(&rules, env)
            }
            None => Ok(TestControl::default()),
        }
    }

    /// Interpret the `control` entry of a driver's test environment.
    ///
    /// `extra` is extended with `env` (the global environment) and `test`
    /// (the test environment) before evaluation.
    pub fn for_test(context: &DriverContext, extra: ConditionEnv) -> Result<TestControl> {
        let env = condition_env(context, extra);
        Self::from_value(context.test_env().get("control"), &env)
    }

    /// Status to report when the body was not executed.
    ///
    /// Skipping a test that was expected to fail is still a failure.
    pub fn skipped_status(&self) -> TestStatus {
        if self.xfail {
            TestStatus::Fail
        } else {
            TestStatus::Unsupported
        }
    }

    /// Correct an observed terminal status for an expected failure.
    pub fn correct(&self, status: TestStatus) -> TestStatus {
        if !self.xfail {
            return status;
        }
        match status {
            TestStatus::Pass => TestStatus::XPass,
            TestStatus::Fail => TestStatus::XFail,
            other => other,
        }
    }
}

/// Condition env of a test: `extra` plus `env` (the global environment)
/// and `test` (the test environment).
pub fn condition_env(context: &DriverContext, extra: ConditionEnv) -> ConditionEnv {
    let mut env = extra;
    env.insert("env".to_string(), Value::from(context.global_env().to_table()));
    env.insert("test".to_string(), Value::from(context.test_env().clone()));
    env
}

/// Condition variables describing the host, available to every rule.
pub fn host_condition_env() -> ConditionEnv {
    let mut env = ConditionEnv::new();
    env.insert("os".to_string(), Value::from(std::env::consts::OS));
    env.insert("arch".to_string(), Value::from(std::env::consts::ARCH));
    env
}

