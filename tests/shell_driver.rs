// tests/shell_driver.rs
#![cfg(unix)]

mod common;
use crate::common::builders::{options_in, SpecsBuilder};
use crate::common::drivers::in_memory_suite;
use crate::common::sink::MemorySink;
use crate::common::{init_tracing, with_timeout, TestResult};

use std::path::Path;
use std::sync::Arc;

use dagsuite::driver::{DriverRegistry, GlobalEnv};
use dagsuite::engine::Testsuite;
use dagsuite::result::TestStatus;
use tempfile::TempDir;

fn shell_suite(dir: &Path, specs: SpecsBuilder) -> Testsuite {
    let (discovery, hooks) = in_memory_suite(specs.build());
    Testsuite::new(options_in(dir), DriverRegistry::with_builtin_drivers())
        .with_discovery(discovery)
        .with_hooks(hooks)
}

fn global(suite: &Testsuite, dir: &Path) -> Arc<GlobalEnv> {
    Arc::new(suite.global_env(dir.join("out"), dir))
}

#[tokio::test]
async fn test_shell_commands_are_judged_on_exit_code_and_output() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let specs = SpecsBuilder::new()
        .test("ok", "driver = \"shell\"\ncmd = \"echo hello\"")
        .test("exit3", "driver = \"shell\"\ncmd = \"exit 3\"")
        .test("expected3", "driver = \"shell\"\ncmd = \"exit 3\"\nexpected_exit = 3")
        .test(
            "matches",
            "driver = \"shell\"\ncmd = \"echo value=42 >&2\"\noutput_matches = \"value=[0-9]+\"",
        )
        .test(
            "mismatch",
            "driver = \"shell\"\ncmd = \"echo nothing\"\noutput_matches = \"^done$\"",
        )
        .test("named", "driver = \"shell\"\ncmd = \"test \\\"$TEST_NAME\\\" = named\"");
    let suite = shell_suite(dir.path(), specs);

    let registration = suite.register(&global(&suite, dir.path()))?;
    assert!(registration.failures.is_empty(), "{:?}", registration.failures);
    let sink = MemorySink::new();
    let summary = with_timeout(suite.execute(registration, Box::new(sink.clone()))).await?;

    assert_eq!(summary.status_of("ok"), Some(TestStatus::Pass));
    assert_eq!(summary.status_of("exit3"), Some(TestStatus::Fail));
    assert_eq!(summary.status_of("expected3"), Some(TestStatus::Pass));
    assert_eq!(summary.status_of("matches"), Some(TestStatus::Pass));
    assert_eq!(summary.status_of("mismatch"), Some(TestStatus::Fail));
    assert_eq!(summary.status_of("named"), Some(TestStatus::Pass));

    let results = sink.results();
    let find = |name: &str| results.iter().find(|r| r.test_name == name).ok_or("missing result");
    assert_eq!(find("ok")?.log, "hello\n");
    assert_eq!(find("exit3")?.msg.as_deref(), Some("exit code 3 (expected 0)"));
    assert!(find("mismatch")?.msg.as_deref().unwrap_or_default().contains("does not match"));

    // Each test ran inside its own working directory.
    assert!(dir.path().join("ok").is_dir());
    Ok(())
}

#[tokio::test]
async fn test_control_rules_apply_to_shell_tests() -> TestResult {
    let dir = TempDir::new()?;
    let specs = SpecsBuilder::new()
        .test(
            "skipped",
            "driver = \"shell\"\ncmd = \"touch ran\"\ncontrol = [[\"SKIP\", \"os != ''\", \"not here\"]]",
        )
        .test(
            "xfail",
            "driver = \"shell\"\ncmd = \"false\"\ncontrol = [[\"XFAIL\", \"true\", \"bug 12\"]]",
        )
        .test(
            "xpass",
            "driver = \"shell\"\ncmd = \"true\"\ncontrol = [[\"XFAIL\", \"test.cmd == 'true'\"]]",
        );
    let suite = shell_suite(dir.path(), specs);

    let registration = suite.register(&global(&suite, dir.path()))?;
    let sink = MemorySink::new();
    let summary = with_timeout(suite.execute(registration, Box::new(sink.clone()))).await?;

    assert_eq!(summary.status_of("skipped"), Some(TestStatus::Unsupported));
    assert!(!dir.path().join("skipped/ran").exists());
    assert_eq!(summary.status_of("xfail"), Some(TestStatus::XFail));
    assert_eq!(summary.status_of("xpass"), Some(TestStatus::XPass));

    let results = sink.results();
    let xfail = results.iter().find(|r| r.test_name == "xfail").ok_or("missing xfail")?;
    assert_eq!(xfail.msg.as_deref(), Some("bug 12 (exit code 1 (expected 0))"));
    Ok(())
}

#[test]
fn test_bad_shell_specs_fail_registration() -> TestResult {
    let dir = TempDir::new()?;
    let deep = format!(
        "driver = \"shell\"\ncmd = \"true\"\ncontrol = [[\"SKIP\", \"{}true{}\"]]",
        "(".repeat(10_000),
        ")".repeat(10_000)
    );
    let specs = SpecsBuilder::new()
        .test("deep", &deep)
        .test("nocmd", "driver = \"shell\"")
        .test("intcmd", "driver = \"shell\"\ncmd = 1")
        .test("badregex", "driver = \"shell\"\ncmd = \"true\"\noutput_matches = \"(\"")
        .test("badexit", "driver = \"shell\"\ncmd = \"true\"\nexpected_exit = \"zero\"")
        .test("badcontrol", "driver = \"shell\"\ncmd = \"true\"\ncontrol = [[\"MAYBE\", \"true\"]]")
        .test("fine", "driver = \"shell\"\ncmd = \"true\"");
    let suite = shell_suite(dir.path(), specs);

    let registration = suite.register(&global(&suite, dir.path()))?;
    assert_eq!(registration.tests, vec!["fine/test.toml"]);
    assert_eq!(registration.failures.len(), 6);
    assert!(registration.failures.contains(&"deep/test.toml".to_string()));
    assert_eq!(registration.graph.len(), 1);
    Ok(())
}
