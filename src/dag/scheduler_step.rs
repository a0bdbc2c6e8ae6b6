// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

/// Structured result of marking one vertex as collected.
///
/// Useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Vertices whose last outstanding predecessor was the collected one,
    /// in the order they entered the ready queue.
    pub newly_ready: Vec<usize>,
    /// Whether nothing is in flight and nothing more will be dispatched.
    pub run_just_finished: bool,
}
