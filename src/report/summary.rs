// src/report/summary.rs

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::result::{TestResult, TestStatus};

const RESET: &str = "\x1b[0m";

/// Aggregate view of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub suite_name: String,
    /// Collected results, in collection order.
    pub results: Vec<TestResult>,
    pub status_counts: BTreeMap<TestStatus, usize>,
    /// Spec files whose registration failed.
    pub registration_failures: Vec<String>,
    /// Set when the circuit breaker stopped dispatch.
    pub aborted: bool,
}

impl RunSummary {
    pub fn count(&self, status: TestStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.status_counts.values().sum()
    }

    pub fn has_failures(&self) -> bool {
        self.status_counts
            .iter()
            .any(|(status, count)| status.is_failure() && *count > 0)
    }

    /// Status of a given test, if a result was recorded for it.
    pub fn status_of(&self, test_name: &str) -> Option<TestStatus> {
        self.results
            .iter()
            .find(|r| r.test_name == test_name)
            .map(|r| r.status)
    }

    /// Process exit code for this run.
    ///
    /// - 1: at least one test could not be registered.
    /// - 2: with `fail_on_test_failure`, a failing status was recorded or
    ///   the run was aborted.
    /// - 0 otherwise.
    pub fn exit_code(&self, fail_on_test_failure: bool) -> i32 {
        if !self.registration_failures.is_empty() {
            1
        } else if fail_on_test_failure && (self.has_failures() || self.aborted) {
            2
        } else {
            0
        }
    }

    /// Summary block: one line per observed status, in display order.
    pub fn render(&self, colors: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Summary for {}:", self.suite_name);
        for status in TestStatus::ALL {
            let count = self.count(status);
            if count == 0 {
                continue;
            }
            let _ = writeln!(out, "  {}: {count}", paint(status, colors));
        }
        if self.total() == 0 {
            let _ = writeln!(out, "  <no test result>");
        }
        if !self.registration_failures.is_empty() {
            let _ = writeln!(
                out,
                "  {} test(s) failed to register",
                self.registration_failures.len()
            );
        }
        if self.aborted {
            let _ = writeln!(out, "  run aborted: too many consecutive failures");
        }
        out
    }
}

fn paint(status: TestStatus, colors: bool) -> String {
    if colors {
        format!("{}{:<12}{RESET}", status.color(), status.name())
    } else {
        format!("{:<12}", status.name())
    }
}

/// The line logged when a result is collected.
///
/// The captured log is appended for unexpected statuses when `show_log` is
/// set.
pub fn render_result_line(result: &TestResult, colors: bool, show_log: bool) -> String {
    let mut line = format!("{} {}", paint(result.status, colors), result.test_name);
    if let Some(msg) = &result.msg {
        line.push_str(": ");
        line.push_str(msg);
    }
    if show_log && !result.status.is_expected() && !result.log.is_empty() {
        line.push('\n');
        line.push_str(&result.log);
    }
    line
}
