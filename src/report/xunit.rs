// src/report/xunit.rs

//! xUnit (JUnit-style) XML export.

use std::fs;
use std::path::Path;

use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use tracing::info;

use crate::errors::Result;
use crate::report::summary::RunSummary;
use crate::result::{TestResult, TestStatus};

/// Build the report for a run.
///
/// PASS and XPASS count as passed, XFAIL and UNSUPPORTED as skipped, FAIL
/// as a failure and ERROR as an error.
pub fn build_report(summary: &RunSummary) -> Report {
    let mut suite = TestSuite::new(summary.suite_name.as_str());
    for result in &summary.results {
        let mut case = TestCase::new(result.test_name.as_str(), case_status(result));
        case.set_classname(summary.suite_name.as_str());
        suite.add_test_case(case);
    }

    let mut report = Report::new(summary.suite_name.as_str());
    report.add_test_suite(suite);
    report
}

fn case_status(result: &TestResult) -> TestCaseStatus {
    let mut status = match result.status {
        TestStatus::Pass | TestStatus::XPass => return TestCaseStatus::success(),
        TestStatus::XFail | TestStatus::Unsupported => TestCaseStatus::skipped(),
        TestStatus::Fail => TestCaseStatus::non_success(NonSuccessKind::Failure),
        TestStatus::Error => TestCaseStatus::non_success(NonSuccessKind::Error),
    };
    if let Some(msg) = &result.msg {
        status.set_message(msg.as_str());
    }
    if !result.log.is_empty() {
        status.set_description(result.log.as_str());
    }
    status
}

/// Render the report for a run as XML text.
pub fn render_xunit(summary: &RunSummary) -> Result<String> {
    Ok(build_report(summary).to_string()?)
}

pub fn write_xunit(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    build_report(summary).serialize(file)?;
    info!(path = %path.display(), "xunit report written");
    Ok(())
}
