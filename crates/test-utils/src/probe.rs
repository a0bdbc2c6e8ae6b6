//! Concurrency probe and a generic job handler for driving the runtime
//! without any test machinery.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dagsuite::dag::Vertex;
use dagsuite::engine::{Job, JobHandler};
use dagsuite::errors::{DagsuiteError, Result};

/// Records how many bodies run at once and in which order they start.
#[derive(Debug, Default)]
pub struct Probe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(&self, uid: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(uid.to_string());
    }

    pub fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Bodies currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

/// Job that sleeps while holding its token.
#[derive(Debug)]
pub struct SleepJob {
    uid: String,
    probe: Arc<Probe>,
    sleep: Duration,
}

impl Job for SleepJob {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn run(&mut self) {
        self.probe.enter(&self.uid);
        thread::sleep(self.sleep);
        self.probe.exit();
    }
}

/// Handler that checks the happens-before contract: every predecessor of a
/// dispatched vertex must already be collected.
#[derive(Debug)]
pub struct ProbeHandler {
    pub probe: Arc<Probe>,
    pub sleep: Duration,
    pub collected: Vec<String>,
    /// Ask to stop once this many jobs were collected.
    pub stop_after: Option<usize>,
    /// Fail `collect` for this uid.
    pub fail_on: Option<String>,
    done: HashSet<String>,
}

impl ProbeHandler {
    pub fn new(sleep: Duration) -> Self {
        Self {
            probe: Probe::new(),
            sleep,
            collected: Vec::new(),
            stop_after: None,
            fail_on: None,
            done: HashSet::new(),
        }
    }

    pub fn stop_after(mut self, n: usize) -> Self {
        self.stop_after = Some(n);
        self
    }

    pub fn fail_on(mut self, uid: &str) -> Self {
        self.fail_on = Some(uid.to_string());
        self
    }
}

impl<P> JobHandler<P> for ProbeHandler {
    type Job = SleepJob;

    fn create_job(&mut self, _index: usize, vertex: &Vertex<P>) -> Result<SleepJob> {
        for pred in vertex.predecessors() {
            if !self.done.contains(pred) {
                return Err(DagsuiteError::SchedulerInvariant(format!(
                    "{} dispatched before {pred} was collected",
                    vertex.uid()
                )));
            }
        }
        Ok(SleepJob {
            uid: vertex.uid().to_string(),
            probe: Arc::clone(&self.probe),
            sleep: self.sleep,
        })
    }

    fn collect(&mut self, job: SleepJob) -> Result<bool> {
        if self.fail_on.as_deref() == Some(job.uid.as_str()) {
            return Err(DagsuiteError::SchedulerInvariant(format!(
                "refusing to collect {}",
                job.uid
            )));
        }
        self.done.insert(job.uid.clone());
        self.collected.push(job.uid);
        Ok(self
            .stop_after
            .is_some_and(|n| self.collected.len() >= n))
    }
}
