// src/engine/runtime.rs

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dag::{Scheduler, SealedGraph, Vertex};
use crate::errors::{DagsuiteError, Result};

/// A unit of work dispatched by the runtime.
///
/// `run` must always return: failures are the job's own business and are
/// reported through whatever the job carries back to `collect`.
pub trait Job: Send + 'static {
    fn uid(&self) -> &str;
    fn run(&mut self);
}

/// The two callbacks a run needs: turning a ready vertex into a job, and
/// collecting a finished job.
///
/// Both are only ever called from the coordinating loop, one at a time, so
/// implementations may freely mutate their state without locking.
pub trait JobHandler<P> {
    type Job: Job;

    /// Build the job for the vertex at `index` (its position in the graph).
    fn create_job(&mut self, index: usize, vertex: &Vertex<P>) -> Result<Self::Job>;

    /// Collect a finished job. Returning `true` stops further dispatch;
    /// jobs already in flight are still drained and collected.
    fn collect(&mut self, job: Self::Job) -> Result<bool>;
}

/// Summary of one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub dispatched: usize,
    pub collected: usize,
    /// Set when `collect` asked to stop dispatching.
    pub stopped_early: bool,
    /// Highest number of jobs simultaneously in flight.
    pub max_in_flight: usize,
}

/// Drives a [`Scheduler`] over a sealed graph, executing jobs on Tokio's
/// blocking pool.
///
/// This is the IO shell around the pure scheduler: the scheduler decides
/// what may run, this loop runs it and feeds completions back.
#[derive(Debug)]
pub struct Runtime<P> {
    graph: SealedGraph<P>,
    scheduler: Scheduler,
}

impl<P> Runtime<P> {
    pub fn new(graph: SealedGraph<P>, concurrency_limit: usize) -> Self {
        let scheduler = Scheduler::new(&graph, concurrency_limit);
        Self { graph, scheduler }
    }

    pub fn graph(&self) -> &SealedGraph<P> {
        &self.graph
    }

    /// Main loop.
    ///
    /// - Dispatches ready vertices while tokens are free.
    /// - Waits for any job to finish and hands it to `collect`.
    /// - Marks the vertex collected, which may make successors ready.
    ///
    /// A fatal error from the handler stops dispatch; in-flight jobs are
    /// drained (never collected) before the error is returned.
    pub async fn run<H>(mut self, handler: &mut H) -> Result<RunOutcome>
    where
        H: JobHandler<P>,
    {
        info!(
            vertices = self.graph.len(),
            concurrency_limit = self.scheduler.concurrency_limit(),
            "runtime started"
        );

        let mut outcome = RunOutcome::default();
        let mut in_flight: JoinSet<(usize, H::Job)> = JoinSet::new();
        let mut fatal: Option<DagsuiteError> = None;

        loop {
            if fatal.is_none() {
                while let Some(index) = self.scheduler.next_dispatch() {
                    let vertex = self.graph.vertex_at(index);
                    match handler.create_job(index, vertex) {
                        Ok(mut job) => {
                            debug!(uid = vertex.uid(), index, "dispatching job");
                            in_flight.spawn_blocking(move || {
                                job.run();
                                (index, job)
                            });
                            outcome.dispatched += 1;
                            outcome.max_in_flight =
                                outcome.max_in_flight.max(self.scheduler.in_flight());
                        }
                        Err(err) => {
                            fatal = Some(err);
                            self.scheduler.request_stop();
                            break;
                        }
                    }
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            let (index, job) = match joined {
                Ok(done) => done,
                Err(join_err) => {
                    // Jobs contain their own failures, so this is a bug.
                    let err = DagsuiteError::SchedulerInvariant(format!(
                        "job terminated abnormally: {join_err}"
                    ));
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                    self.scheduler.request_stop();
                    continue;
                }
            };

            if fatal.is_some() {
                debug!(uid = job.uid(), "draining job after fatal error");
                continue;
            }

            match handler.collect(job) {
                Ok(stop) => {
                    outcome.collected += 1;
                    if stop && !self.scheduler.stop_requested() {
                        warn!("collect requested stop; no new jobs will be dispatched");
                        self.scheduler.request_stop();
                        outcome.stopped_early = true;
                    }
                }
                Err(err) => {
                    fatal = Some(err);
                    self.scheduler.request_stop();
                    continue;
                }
            }

            match self.scheduler.complete(index) {
                Ok(step) if !step.newly_ready.is_empty() => {
                    debug!(newly_ready = ?step.newly_ready, "vertices became ready");
                }
                Ok(_) => {}
                Err(err) => {
                    fatal = Some(err);
                    self.scheduler.request_stop();
                }
            }
        }

        if let Some(err) = fatal {
            warn!(error = %err, "runtime aborted");
            return Err(err);
        }

        self.scheduler.ensure_complete()?;

        if outcome.stopped_early {
            let skipped = self.scheduler.undispatched().len();
            info!(skipped, "runtime stopped early");
        }

        info!(
            dispatched = outcome.dispatched,
            collected = outcome.collected,
            "runtime exiting"
        );
        Ok(outcome)
    }
}

