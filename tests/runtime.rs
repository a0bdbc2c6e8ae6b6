// tests/runtime.rs

mod common;
use crate::common::builders::GraphBuilder;
use crate::common::probe::ProbeHandler;
use crate::common::{init_tracing, with_timeout, TestResult};

use std::time::Duration;

use dagsuite::engine::Runtime;
use dagsuite::errors::DagsuiteError;

const SLEEP: Duration = Duration::from_millis(20);

#[tokio::test]
async fn test_limit_one_never_overlaps_jobs() -> TestResult {
    init_tracing();

    let sealed = GraphBuilder::wide(10).build().seal()?;
    let mut handler = ProbeHandler::new(SLEEP);
    let outcome = with_timeout(Runtime::new(sealed, 1).run(&mut handler)).await?;

    assert_eq!(outcome.dispatched, 10);
    assert_eq!(outcome.collected, 10);
    assert_eq!(outcome.max_in_flight, 1);
    assert_eq!(handler.probe.max_in_flight(), 1);
    // Deterministic order with a single token.
    let expected: Vec<String> = (0..10).map(GraphBuilder::uid).collect();
    assert_eq!(handler.collected, expected);
    Ok(())
}

#[tokio::test]
async fn test_limit_four_caps_concurrency_on_wide_graph() -> TestResult {
    init_tracing();

    let sealed = GraphBuilder::wide(10).build().seal()?;
    let mut handler = ProbeHandler::new(SLEEP);
    let outcome = with_timeout(Runtime::new(sealed, 4).run(&mut handler)).await?;

    assert_eq!(outcome.collected, 10);
    assert!(outcome.max_in_flight <= 4);
    assert!(handler.probe.max_in_flight() <= 4);
    assert!(handler.probe.max_in_flight() >= 2, "jobs should overlap");
    Ok(())
}

#[tokio::test]
async fn test_chain_runs_in_dependency_order() -> TestResult {
    init_tracing();

    let sealed = GraphBuilder::chain(5).build().seal()?;
    let mut handler = ProbeHandler::new(Duration::ZERO);
    with_timeout(Runtime::new(sealed, 8).run(&mut handler)).await?;

    // ProbeHandler itself fails the run if a vertex is dispatched early.
    assert_eq!(handler.collected, vec!["v0", "v1", "v2", "v3", "v4"]);
    Ok(())
}

#[tokio::test]
async fn test_stop_request_drains_in_flight_jobs() -> TestResult {
    init_tracing();

    let sealed = GraphBuilder::wide(12).build().seal()?;
    let mut handler = ProbeHandler::new(SLEEP).stop_after(1);
    let outcome = with_timeout(Runtime::new(sealed, 3).run(&mut handler)).await?;

    assert!(outcome.stopped_early);
    // Everything dispatched was collected; nothing new started after the stop.
    assert_eq!(outcome.dispatched, outcome.collected);
    assert!(outcome.dispatched < 12);
    assert!(outcome.dispatched <= 3 + 1);
    Ok(())
}

#[tokio::test]
async fn test_collect_error_is_fatal_after_draining() -> TestResult {
    init_tracing();

    let sealed = GraphBuilder::chain(3).build().seal()?;
    let mut handler = ProbeHandler::new(Duration::ZERO).fail_on("v1");
    let result = with_timeout(Runtime::new(sealed, 2).run(&mut handler)).await;

    match result {
        Err(DagsuiteError::SchedulerInvariant(msg)) => assert!(msg.contains("v1")),
        other => panic!("expected the collect error, got {other:?}"),
    }
    assert_eq!(handler.collected, vec!["v0"]);
    assert_eq!(handler.probe.started(), vec!["v0", "v1"]);
    Ok(())
}

#[tokio::test]
async fn test_fatal_error_never_leaves_jobs_running() -> TestResult {
    init_tracing();

    let sealed = GraphBuilder::wide(6).build().seal()?;
    let mut handler = ProbeHandler::new(SLEEP).fail_on("v0");
    let result = with_timeout(Runtime::new(sealed, 3).run(&mut handler)).await;

    assert!(matches!(result, Err(DagsuiteError::SchedulerInvariant(_))));
    // Every body that started has returned by the time `run` does.
    assert_eq!(handler.probe.in_flight(), 0);
    assert!(!handler.collected.contains(&"v0".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_empty_graph_completes_immediately() -> TestResult {
    let sealed = GraphBuilder::new().build().seal()?;
    let mut handler = ProbeHandler::new(Duration::ZERO);
    let outcome = Runtime::new(sealed, 4).run(&mut handler).await?;
    assert_eq!(outcome.dispatched, 0);
    assert!(!outcome.stopped_early);
    Ok(())
}
