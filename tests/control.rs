// tests/control.rs

mod common;
use crate::common::TestResult;

use dagsuite::control::{
    host_condition_env, Condition, ConditionEnv, ControlKind, ControlRule, ExprError, TestControl,
    Value, MAX_NESTING,
};
use dagsuite::errors::DagsuiteError;
use dagsuite::result::TestStatus;

fn rules(source: &str) -> toml::Value {
    let table: toml::Table = toml::from_str(&format!("control = {source}")).expect("valid TOML");
    table["control"].clone()
}

fn env() -> ConditionEnv {
    let mut env = host_condition_env();
    let test: toml::Table = toml::from_str(
        r#"
        tags = ["slow", "net"]
        jobs = 4
        [target]
        platform = "x86_64-linux"
        "#,
    )
    .expect("valid TOML");
    env.insert("test".to_string(), Value::from(test));
    env.insert("debug".to_string(), Value::from(false));
    env
}

/// Apply the consumption contract around a body with the given outcome.
fn run_with(control: &TestControl, body: TestStatus) -> (TestStatus, bool) {
    if control.skip {
        return (control.skipped_status(), false);
    }
    (control.correct(body), true)
}

#[test]
fn test_xfail_inverts_pass_and_fail() -> TestResult {
    let control = TestControl::from_value(Some(&rules(r#"[["XFAIL", "true"]]"#)), &env())?;
    assert_eq!(control, TestControl { skip: false, xfail: true, message: None });

    assert_eq!(run_with(&control, TestStatus::Pass), (TestStatus::XPass, true));
    assert_eq!(run_with(&control, TestStatus::Fail), (TestStatus::XFail, true));
    assert_eq!(run_with(&control, TestStatus::Error), (TestStatus::Error, true));
    Ok(())
}

#[test]
fn test_skip_never_runs_the_body() -> TestResult {
    let control = TestControl::from_value(
        Some(&rules(r#"[["SKIP", "true", "not today"]]"#)),
        &env(),
    )?;
    assert!(control.skip);
    assert!(!control.xfail);
    assert_eq!(control.message.as_deref(), Some("not today"));

    let (status, executed) = run_with(&control, TestStatus::Pass);
    assert_eq!(status, TestStatus::Unsupported);
    assert!(!executed);
    Ok(())
}

#[test]
fn test_skipping_an_expected_failure_reports_fail() {
    let control = TestControl { skip: true, xfail: true, message: None };
    assert_eq!(control.skipped_status(), TestStatus::Fail);
}

#[test]
fn test_unknown_kind_reports_index_before_any_evaluation() {
    // Rule 1 would raise a NameError if it were evaluated.
    let control = rules(r#"[["SKIP", "undefined_name"], ["BOGUS", "true"]]"#);
    match TestControl::from_value(Some(&control), &env()) {
        Err(DagsuiteError::ControlRule { index, reason }) => {
            assert_eq!(index, 2);
            assert!(reason.contains("invalid kind: BOGUS"), "{reason}");
        }
        other => panic!("expected ControlRule error, got {other:?}"),
    }

    match TestControl::from_value(Some(&rules(r#"[["BOGUS", "true"]]"#)), &env()) {
        Err(err @ DagsuiteError::ControlRule { index: 1, .. }) => {
            assert!(err.to_string().starts_with("Configuration error: control rule #1"));
        }
        other => panic!("expected ControlRule error for rule 1, got {other:?}"),
    }
}

#[test]
fn test_malformed_rule_shapes() {
    for (source, index) in [
        (r#"[["SKIP"]]"#, 1),
        (r#"[["SKIP", "true", "msg", "extra"]]"#, 1),
        (r#"[["NONE", "true"], ["XFAIL", 1]]"#, 2),
        (r#"[["NONE", "true"], "SKIP"]"#, 2),
    ] {
        match ControlRule::parse_list(&rules(source)) {
            Err(DagsuiteError::ControlRule { index: got, reason }) => {
                assert_eq!(got, index, "{source}");
                assert!(reason.contains("list of 2 or 3 strings expected"), "{reason}");
            }
            other => panic!("{source}: expected ControlRule error, got {other:?}"),
        }
    }

    match ControlRule::parse_list(&toml::Value::String("SKIP".into())) {
        Err(DagsuiteError::ConfigError(msg)) => assert!(msg.contains("list expected")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_condition_syntax_is_checked_during_validation() {
    match ControlRule::parse_list(&rules(r#"[["NONE", "true"], ["SKIP", "a == "]]"#)) {
        Err(DagsuiteError::ControlRule { index, reason }) => {
            assert_eq!(index, 2);
            assert!(reason.contains("SyntaxError"), "{reason}");
        }
        other => panic!("expected ControlRule error, got {other:?}"),
    }
}

#[test]
fn test_first_matching_rule_wins_and_later_rules_are_not_evaluated() -> TestResult {
    let control = TestControl::from_value(
        Some(&rules(
            r#"[
                ["NONE", "debug"],
                ["XFAIL", "'slow' in test.tags", "flaky on CI"],
                ["SKIP", "undefined_name"]
            ]"#,
        )),
        &env(),
    )?;
    assert_eq!(
        control,
        TestControl { skip: false, xfail: true, message: Some("flaky on CI".to_string()) }
    );
    Ok(())
}

#[test]
fn test_evaluation_error_reports_rule_index() {
    let control = rules(r#"[["NONE", "false"], ["SKIP", "nope == 1"]]"#);
    match TestControl::from_value(Some(&control), &env()) {
        Err(DagsuiteError::ControlRule { index, reason }) => {
            assert_eq!(index, 2);
            assert!(reason.contains("NameError"), "{reason}");
        }
        other => panic!("expected ControlRule error, got {other:?}"),
    }
}

#[test]
fn test_no_match_and_no_rules_give_default_decision() -> TestResult {
    let none = TestControl::from_value(None, &env())?;
    assert_eq!(none, TestControl::default());

    let unmatched = TestControl::from_value(Some(&rules(r#"[["SKIP", "false"]]"#)), &env())?;
    assert_eq!(unmatched, TestControl::default());
    assert_eq!(unmatched.correct(TestStatus::Pass), TestStatus::Pass);
    Ok(())
}

#[test]
fn test_kind_names() {
    assert_eq!("NONE".parse::<ControlKind>(), Ok(ControlKind::None));
    assert_eq!("XFAIL".parse::<ControlKind>(), Ok(ControlKind::XFail));
    assert!("skip".parse::<ControlKind>().is_err());
}

#[test]
fn test_condition_grammar() -> TestResult {
    let env = env();
    let holds = |source: &str| -> Result<bool, ExprError> { Condition::parse(source)?.is_true(&env) };

    assert!(holds("test.jobs >= 4 and test.jobs < 8")?);
    assert!(holds("not debug or False")?);
    assert!(holds("test.target.platform == 'x86_64-linux'")?);
    assert!(holds("'linux' in test.target.platform")?);
    assert!(holds("'gpu' not in test.tags")?);
    assert!(holds("'target' in test")?);
    assert!(holds("(1 == 2) == false")?);
    assert!(holds("test.jobs in [1, 2, 4]")?);
    assert!(!holds("[]")?);
    assert!(holds("os != ''")?);
    assert!(!holds("\"\"")?);

    assert_eq!(
        holds("missing.field"),
        Err(ExprError::UnknownVariable("missing.field".to_string()))
    );
    assert!(matches!(holds("test.jobs < 'four'"), Err(ExprError::Type(_))));
    assert!(matches!(Condition::parse("import os"), Err(ExprError::Syntax { .. })));
    assert!(matches!(Condition::parse("(true"), Err(ExprError::Syntax { .. })));
    Ok(())
}

#[test]
fn test_deeply_nested_conditions_are_syntax_errors() -> TestResult {
    let depth = 50_000;
    for (open, close) in [("(", ")"), ("[", "]"), ("not ", "")] {
        let source = format!("{}true{}", open.repeat(depth), close.repeat(depth));
        match Condition::parse(&source) {
            Err(ExprError::Syntax { message, .. }) => {
                assert_eq!(message, "expression nested too deeply")
            }
            other => panic!("expected a syntax error for {open:?} nesting, got {other:?}"),
        }
    }

    // Nesting right up to the limit still parses.
    let fits = format!("{}true{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
    assert_eq!(Condition::parse(&fits)?.evaluate(&env())?, Value::Bool(true));
    let too_deep = format!("{}true", "not ".repeat(MAX_NESTING + 1));
    assert!(matches!(Condition::parse(&too_deep), Err(ExprError::Syntax { .. })));
    Ok(())
}
