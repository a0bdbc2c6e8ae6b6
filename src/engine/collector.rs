// src/engine/collector.rs

//! Run-state of the orchestrator and the `collect` side of a run.
//!
//! Everything here is mutated only from the runtime's coordinating loop,
//! one collection at a time.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::dag::Vertex;
use crate::driver::PushOrigin;
use crate::engine::fragment::{Fragment, FragmentOutcome, FragmentSpec, PreviousValues};
use crate::engine::runtime::{Job, JobHandler};
use crate::errors::{DagsuiteError, Result};
use crate::report::{render_result_line, ResultSink, RunSummary};
use crate::result::{TestResult, TestStatus};

/// Knobs of the collection side.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectSettings {
    /// 0 disables the circuit breaker.
    pub max_consecutive_failures: usize,
    pub show_error_output: bool,
    pub enable_colors: bool,
}

/// Stops a run after too many failing results in a row.
///
/// FAIL, ERROR and XPASS count; PASS and XFAIL reset the count;
/// UNSUPPORTED is neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitBreaker {
    threshold: usize,
    consecutive: usize,
    tripped: bool,
}

impl CircuitBreaker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Account for one result; returns whether the run must stop.
    pub fn record(&mut self, status: TestStatus) -> bool {
        if status.is_failure() {
            self.consecutive += 1;
        } else if matches!(status, TestStatus::Pass | TestStatus::XFail) {
            self.consecutive = 0;
        }

        if self.threshold > 0 && self.consecutive > self.threshold {
            self.tripped = true;
        }
        self.tripped
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn tripped(&self) -> bool {
        self.tripped
    }
}

/// Orchestrator run-state, and the [`JobHandler`] feeding fragments to the
/// runtime.
pub struct Collector {
    sink: Box<dyn ResultSink>,
    settings: CollectSettings,
    /// Outcome of every collected fragment, by uid.
    return_values: HashMap<String, FragmentOutcome>,
    /// Where each recorded test name was pushed from.
    result_origins: HashMap<String, PushOrigin>,
    status_counters: BTreeMap<TestStatus, usize>,
    results: Vec<TestResult>,
    breaker: CircuitBreaker,
}

impl Collector {
    pub fn new(sink: Box<dyn ResultSink>, settings: CollectSettings) -> Self {
        Self {
            sink,
            settings,
            return_values: HashMap::new(),
            result_origins: HashMap::new(),
            status_counters: BTreeMap::new(),
            results: Vec::new(),
            breaker: CircuitBreaker::new(settings.max_consecutive_failures),
        }
    }

    pub fn status_counters(&self) -> &BTreeMap<TestStatus, usize> {
        &self.status_counters
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn return_value(&self, uid: &str) -> Option<&FragmentOutcome> {
        self.return_values.get(uid)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Record one pushed result: reject duplicates, persist, count, log.
    pub fn record(&mut self, result: TestResult, origin: PushOrigin) -> Result<()> {
        if let Some(first) = self.result_origins.get(&result.test_name) {
            return Err(DagsuiteError::DuplicateResult {
                test_name: result.test_name,
                first: first.clone(),
                second: origin,
            });
        }

        self.sink.persist(&result)?;

        *self.status_counters.entry(result.status).or_insert(0) += 1;
        info!(
            "{}",
            render_result_line(
                &result,
                self.settings.enable_colors,
                self.settings.show_error_output
            )
        );

        let was_tripped = self.breaker.tripped();
        if self.breaker.record(result.status) && !was_tripped {
            warn!(
                consecutive = self.breaker.consecutive(),
                threshold = self.settings.max_consecutive_failures,
                "too many consecutive failures, stopping the run"
            );
        }

        self.result_origins.insert(result.test_name.clone(), origin);
        self.results.push(result);
        Ok(())
    }

    /// Consume the run-state into a summary.
    pub fn into_summary(self, suite_name: &str, registration_failures: Vec<String>) -> RunSummary {
        RunSummary {
            suite_name: suite_name.to_string(),
            aborted: self.breaker.tripped(),
            results: self.results,
            status_counts: self.status_counters,
            registration_failures,
        }
    }
}

impl JobHandler<FragmentSpec> for Collector {
    type Job = Fragment;

    fn create_job(&mut self, index: usize, vertex: &Vertex<FragmentSpec>) -> Result<Fragment> {
        let spec = vertex.payload();
        let mut predecessors = Vec::with_capacity(vertex.predecessors().len());
        for uid in vertex.predecessors() {
            let Some(outcome) = self.return_values.get(uid) else {
                return Err(DagsuiteError::SchedulerInvariant(format!(
                    "'{}' dispatched before its predecessor '{uid}' was collected",
                    vertex.uid()
                )));
            };
            predecessors.push((uid.as_str(), outcome.clone()));
        }

        let previous = PreviousValues::for_test(spec.context.test_name(), predecessors);
        Ok(Fragment::new(vertex.uid(), index, spec, previous))
    }

    fn collect(&mut self, fragment: Fragment) -> Result<bool> {
        self.return_values
            .insert(fragment.uid().to_string(), fragment.outcome().clone());

        while let Some((result, origin)) = fragment.context().results().pop() {
            self.record(result, origin)?;
        }

        Ok(self.breaker.tripped())
    }
}
