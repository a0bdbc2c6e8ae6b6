// src/result.rs

//! Test verdicts and the result records drivers push.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::driver::TestEnv;

/// Terminal verdict of a test.
///
/// Declaration order is the display order used by the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    XFail,
    XPass,
    Error,
    /// Not executed (skipped by a control rule or by the driver).
    Unsupported,
}

impl TestStatus {
    pub const ALL: [TestStatus; 6] = [
        TestStatus::Pass,
        TestStatus::Fail,
        TestStatus::XFail,
        TestStatus::XPass,
        TestStatus::Error,
        TestStatus::Unsupported,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::XFail => "XFAIL",
            TestStatus::XPass => "XPASS",
            TestStatus::Error => "ERROR",
            TestStatus::Unsupported => "UNSUPPORTED",
        }
    }

    /// ANSI SGR sequence used when rendering this status on a terminal.
    pub fn color(self) -> &'static str {
        match self {
            TestStatus::Pass => "\x1b[32m",
            TestStatus::Fail | TestStatus::Error => "\x1b[31m",
            TestStatus::XFail => "\x1b[33m",
            TestStatus::XPass => "\x1b[35m",
            TestStatus::Unsupported => "\x1b[34m",
        }
    }

    /// Statuses for which a failing test's log is worth showing.
    pub fn is_expected(self) -> bool {
        matches!(self, TestStatus::Pass | TestStatus::XFail | TestStatus::XPass)
    }

    /// Statuses that count against the consecutive-failure breaker and the
    /// strict exit code.
    pub fn is_failure(self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error | TestStatus::XPass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PASS" => Ok(TestStatus::Pass),
            "FAIL" => Ok(TestStatus::Fail),
            "XFAIL" => Ok(TestStatus::XFail),
            "XPASS" => Ok(TestStatus::XPass),
            "ERROR" => Ok(TestStatus::Error),
            "UNSUPPORTED" | "SKIP" => Ok(TestStatus::Unsupported),
            other => Err(format!("invalid test status: {other}")),
        }
    }
}

/// Outcome of one test, as persisted in the per-test result file.
///
/// Built once by a driver and never mutated after being pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default)]
    pub log: String,
    /// Snapshot of the test environment at the time the result was built.
    #[serde(default)]
    pub env: TestEnv,
}

impl TestResult {
    pub fn new(test_name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            test_name: test_name.into(),
            status,
            msg: None,
            log: String::new(),
            env: TestEnv::new(),
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    pub fn with_env(mut self, env: TestEnv) -> Self {
        self.env = env;
        self
    }
}
