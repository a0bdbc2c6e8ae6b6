// src/engine/mod.rs

//! Execution engine.
//!
//! - [`fragment`]: the jobs dispatched for each graph vertex.
//! - [`runtime`]: the async shell driving the pure [`crate::dag::Scheduler`].
//! - [`collector`]: orchestrator run-state, fed by the runtime.
//! - [`testsuite`]: the orchestrator itself.
//! - [`workspace`]: output and working directory layout.

pub mod collector;
pub mod fragment;
pub mod runtime;
pub mod testsuite;
pub mod workspace;

pub use collector::{CircuitBreaker, CollectSettings, Collector};
pub use fragment::{
    Fragment, FragmentError, FragmentFailure, FragmentGraph, FragmentOutcome, FragmentSpec,
    FragmentValue, PreviousValues,
};
pub use runtime::{Job, JobHandler, RunOutcome, Runtime};
pub use testsuite::{Registration, SuiteHooks, Testsuite};
