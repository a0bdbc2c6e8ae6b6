// src/dag/mod.rs

//! Dependency graph representation and scheduling.
//!
//! - [`graph`] holds the incrementally built graph, its validation and the
//!   sealed form consumed by a run.
//! - [`scheduler`] contains the synchronous readiness/token state machine
//!   that decides which vertex may be dispatched next.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`vertex_state`] describes a vertex's per-run lifecycle.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod vertex_state;

pub use graph::{Checkpoint, DependencyGraph, GraphError, SealedGraph, Vertex};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use vertex_state::VertexState;
