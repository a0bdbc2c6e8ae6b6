// tests/fragment.rs

mod common;
use crate::common::builders::spec;
use crate::common::{init_tracing, TestResult};

use std::sync::Arc;

use anyhow::anyhow;
use dagsuite::driver::{DriverContext, GlobalEnv};
use dagsuite::engine::{
    Fragment, FragmentError, FragmentOutcome, FragmentSpec, FragmentValue, PreviousValues,
};
use dagsuite::result::TestStatus;

fn context(test_name: &str) -> Arc<DriverContext> {
    DriverContext::new(
        Arc::new(GlobalEnv::default()),
        spec(&format!("test_name = \"{test_name}\"\nlevel = 3")),
    )
    .expect("context")
}

fn fragment<F>(ctx: &Arc<DriverContext>, index: usize, body: F) -> Fragment
where
    F: Fn(&PreviousValues) -> Result<FragmentValue, FragmentError> + Send + Sync + 'static,
{
    let spec = FragmentSpec::new(Arc::clone(ctx), body);
    Fragment::new(&ctx.fragment_uid("body"), index, &spec, PreviousValues::default())
}

#[test]
fn test_failing_body_becomes_one_error_result() -> TestResult {
    init_tracing();
    let ctx = context("T");
    let mut frag = fragment(&ctx, 7, |_| {
        Err(anyhow!("disk on fire").context("while building").into())
    });

    frag.execute();

    let (result, _origin) = ctx.results().pop().expect("one result");
    assert!(ctx.results().is_empty());
    assert_eq!(result.test_name, "T__except7");
    assert_eq!(result.status, TestStatus::Error);
    assert_eq!(result.msg.as_deref(), Some("while building"));
    assert!(result.log.contains("disk on fire"));
    assert_eq!(result.env.get("level").and_then(|v| v.as_integer()), Some(3));

    let failure = frag.outcome().failure().expect("failure forwarded as data");
    assert_eq!(failure.uid, "T.body");
    assert_eq!(failure.message, "while building");
    Ok(())
}

#[test]
fn test_panicking_body_is_contained() -> TestResult {
    let ctx = context("P");
    let mut frag = fragment(&ctx, 0, |_| panic!("boom"));

    frag.execute();

    let (result, _) = ctx.results().pop().expect("one result");
    assert_eq!(result.test_name, "P__except0");
    assert_eq!(result.status, TestStatus::Error);
    assert!(result.msg.unwrap_or_default().contains("boom"));
    assert!(frag.outcome().is_failed());
    Ok(())
}

#[test]
fn test_abort_is_silent() -> TestResult {
    let ctx = context("A");
    let mut frag = fragment(&ctx, 1, |_| Err(FragmentError::Abort));

    frag.execute();

    assert!(ctx.results().is_empty());
    assert!(matches!(frag.outcome(), FragmentOutcome::Aborted));
    Ok(())
}

#[test]
fn test_value_is_exposed_to_dependents() -> TestResult {
    let ctx = context("V");
    let mut frag = fragment(&ctx, 2, |_| Ok(FragmentValue::new(41_u32 + 1)));

    frag.execute();

    assert!(ctx.results().is_empty());
    let value = frag.outcome().value().expect("value");
    assert_eq!(value.get::<u32>(), Some(&42));
    assert_eq!(value.get::<String>(), None);
    Ok(())
}

#[test]
fn test_sibling_keys_are_shortened_and_foreign_keys_kept() -> TestResult {
    let previous = PreviousValues::for_test(
        "T",
        [
            ("T.setup", FragmentOutcome::Value(FragmentValue::new("ready"))),
            ("U.other", FragmentOutcome::Value(FragmentValue::none())),
            ("TT.lookalike", FragmentOutcome::Aborted),
        ],
    );

    let keys: Vec<&str> = previous.keys().collect();
    assert_eq!(keys, vec!["TT.lookalike", "U.other", "setup"]);
    assert_eq!(previous.value::<&str>("setup"), Some(&"ready"));
    Ok(())
}

#[test]
fn test_body_sees_predecessor_failure_explicitly() -> TestResult {
    let ctx = context("T");
    let upstream = context("U");

    let mut failing = Fragment::new(
        "U.build",
        0,
        &FragmentSpec::new(Arc::clone(&upstream), |_| Err(anyhow!("no compiler").into())),
        PreviousValues::default(),
    );
    failing.execute();

    let previous = PreviousValues::for_test("T", [("U.build", failing.outcome().clone())]);
    let spec = FragmentSpec::new(Arc::clone(&ctx), |prev: &PreviousValues| {
        match prev.failure("U.build") {
            Some(failure) => Ok(FragmentValue::new(format!("skipped: {}", failure.message))),
            None => Ok(FragmentValue::new("ran".to_string())),
        }
    });
    let mut dependent = Fragment::new("T.run", 1, &spec, previous);
    dependent.execute();

    let value = dependent.outcome().value().expect("dependent ran");
    assert_eq!(value.get::<String>().map(String::as_str), Some("skipped: no compiler"));
    assert!(ctx.results().is_empty());
    assert_eq!(upstream.results().len(), 1);
    Ok(())
}
