// tests/scheduler.rs

mod common;
use crate::common::builders::GraphBuilder;
use crate::common::TestResult;

use std::collections::HashSet;

use dagsuite::dag::{DependencyGraph, Scheduler, VertexState};
use dagsuite::errors::DagsuiteError;
use proptest::prelude::*;

#[test]
fn test_roots_are_ready_in_insertion_order() -> TestResult {
    let sealed = GraphBuilder::new()
        .vertex(&[])
        .vertex(&[0])
        .vertex(&[])
        .vertex(&[])
        .build()
        .seal()?;
    let scheduler = Scheduler::new(&sealed, 2);

    assert_eq!(scheduler.ready_queue(), vec![0, 2, 3]);
    assert_eq!(scheduler.state_of(1), Some(VertexState::Waiting));
    Ok(())
}

#[test]
fn test_tokens_bound_dispatch() -> TestResult {
    let sealed = GraphBuilder::wide(5).build().seal()?;
    let mut scheduler = Scheduler::new(&sealed, 2);

    assert_eq!(scheduler.next_dispatch(), Some(0));
    assert_eq!(scheduler.next_dispatch(), Some(1));
    assert_eq!(scheduler.next_dispatch(), None, "no token left");
    assert_eq!(scheduler.in_flight(), 2);

    scheduler.complete(1)?;
    assert_eq!(scheduler.next_dispatch(), Some(2));
    Ok(())
}

#[test]
fn test_successor_ready_only_after_last_predecessor() -> TestResult {
    // v2 waits for v0 and v1.
    let sealed = GraphBuilder::new()
        .vertex(&[])
        .vertex(&[])
        .vertex(&[0, 1])
        .build()
        .seal()?;
    let mut scheduler = Scheduler::new(&sealed, 4);

    assert_eq!(scheduler.next_dispatch(), Some(0));
    assert_eq!(scheduler.next_dispatch(), Some(1));

    let step = scheduler.complete(0)?;
    assert!(step.newly_ready.is_empty());
    assert_eq!(scheduler.state_of(2), Some(VertexState::Waiting));

    let step = scheduler.complete(1)?;
    assert_eq!(step.newly_ready, vec![2]);
    assert!(!step.run_just_finished);

    assert_eq!(scheduler.next_dispatch(), Some(2));
    let step = scheduler.complete(2)?;
    assert!(step.run_just_finished);
    scheduler.ensure_complete()?;
    Ok(())
}

#[test]
fn test_completing_a_vertex_twice_is_an_invariant_error() -> TestResult {
    let sealed = GraphBuilder::wide(1).build().seal()?;
    let mut scheduler = Scheduler::new(&sealed, 1);

    let index = scheduler.next_dispatch().expect("root is ready");
    scheduler.complete(index)?;
    match scheduler.complete(index) {
        Err(DagsuiteError::SchedulerInvariant(msg)) => assert!(msg.contains("Collected")),
        other => panic!("expected SchedulerInvariant, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_stop_request_halts_dispatch_but_not_completion() -> TestResult {
    let sealed = GraphBuilder::wide(4).build().seal()?;
    let mut scheduler = Scheduler::new(&sealed, 2);

    let a = scheduler.next_dispatch().expect("token free");
    let b = scheduler.next_dispatch().expect("token free");
    scheduler.request_stop();
    assert_eq!(scheduler.next_dispatch(), None);

    scheduler.complete(a)?;
    assert!(!scheduler.is_drained());
    scheduler.complete(b)?;
    assert!(scheduler.is_drained());
    assert_eq!(scheduler.undispatched(), vec![2, 3]);
    scheduler.ensure_complete()?;
    Ok(())
}

#[test]
fn test_zero_limit_is_treated_as_one() -> TestResult {
    let sealed = GraphBuilder::wide(3).build().seal()?;
    let mut scheduler = Scheduler::new(&sealed, 0);
    assert_eq!(scheduler.concurrency_limit(), 1);
    assert!(scheduler.next_dispatch().is_some());
    assert!(scheduler.next_dispatch().is_none());
    Ok(())
}

// Random DAGs: vertex i may only depend on vertices 0..i, which keeps them
// acyclic.
fn dag_strategy(max_vertices: usize) -> impl Strategy<Value = DependencyGraph<()>> {
    (1..=max_vertices).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            move |raw| {
                let mut builder = GraphBuilder::new();
                for (i, candidates) in raw.into_iter().enumerate() {
                    let preds: HashSet<usize> = if i == 0 {
                        HashSet::new()
                    } else {
                        candidates.into_iter().map(|c| c % i).collect()
                    };
                    let mut preds: Vec<usize> = preds.into_iter().collect();
                    preds.sort();
                    builder = builder.vertex(&preds);
                }
                builder.build()
            },
        )
    })
}

proptest! {
    #[test]
    fn prop_every_vertex_runs_after_its_predecessors(
        graph in dag_strategy(24),
        limit in 1usize..6,
        picks in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let sealed = graph.seal().unwrap();
        let mut scheduler = Scheduler::new(&sealed, limit);
        let mut running: Vec<usize> = Vec::new();
        let mut collected: HashSet<usize> = HashSet::new();
        let mut pick = picks.into_iter().cycle();

        loop {
            while let Some(index) = scheduler.next_dispatch() {
                for pred in sealed.predecessor_indices(index) {
                    prop_assert!(collected.contains(pred), "v{} dispatched before v{}", index, pred);
                }
                running.push(index);
                prop_assert!(running.len() <= limit);
            }
            if running.is_empty() {
                break;
            }
            // Complete some in-flight vertex, in arbitrary order.
            let slot = pick.next().unwrap_or(0) % running.len();
            let index = running.swap_remove(slot);
            scheduler.complete(index).unwrap();
            collected.insert(index);
        }

        prop_assert_eq!(collected.len(), sealed.len());
        prop_assert!(scheduler.ensure_complete().is_ok());
    }
}
