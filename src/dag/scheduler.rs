use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::dag::graph::SealedGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::vertex_state::VertexState;
use crate::errors::{DagsuiteError, Result};

/// Scheduler holds the readiness bookkeeping for one run over a sealed
/// graph.
///
/// It is responsible for:
/// - tracking how many predecessors of each vertex are still outstanding
/// - keeping the ready queue in a deterministic order
/// - handing out at most `concurrency_limit` tokens at a time
/// - honouring an early-stop request without abandoning in-flight work
///
/// It performs no IO and knows nothing about jobs; the async shell in
/// [`crate::engine::runtime`] drives it.
#[derive(Debug)]
pub struct Scheduler {
    successors: Vec<Vec<usize>>,
    /// Number of predecessors not collected yet, per vertex.
    outstanding: Vec<usize>,
    states: Vec<VertexState>,
    ready: VecDeque<usize>,
    concurrency_limit: usize,
    in_flight: usize,
    stop_requested: bool,
}

impl Scheduler {
    /// Build a scheduler for `graph`. A limit of 0 is treated as 1.
    pub fn new<P>(graph: &SealedGraph<P>, concurrency_limit: usize) -> Self {
        let n = graph.len();
        let mut outstanding = Vec::with_capacity(n);
        let mut states = Vec::with_capacity(n);
        let mut ready = VecDeque::new();
        let mut successors = Vec::with_capacity(n);

        for i in 0..n {
            let preds = graph.predecessor_indices(i).len();
            outstanding.push(preds);
            successors.push(graph.successor_indices(i).to_vec());
            if preds == 0 {
                states.push(VertexState::Ready);
                ready.push_back(i);
            } else {
                states.push(VertexState::Waiting);
            }
        }

        debug!(
            vertices = n,
            roots = ready.len(),
            concurrency_limit,
            "scheduler: initialised"
        );

        Self {
            successors,
            outstanding,
            states,
            ready,
            concurrency_limit: concurrency_limit.max(1),
            in_flight: 0,
            stop_requested: false,
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Number of dispatched, not yet collected vertices.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn state_of(&self, index: usize) -> Option<VertexState> {
        self.states.get(index).copied()
    }

    /// Vertices currently waiting in the ready queue, in dispatch order.
    pub fn ready_queue(&self) -> Vec<usize> {
        self.ready.iter().copied().collect()
    }

    /// Pop the next vertex to dispatch, taking a token.
    ///
    /// Returns `None` when no token is free, nothing is ready, or a stop was
    /// requested.
    pub fn next_dispatch(&mut self) -> Option<usize> {
        if self.stop_requested || self.in_flight >= self.concurrency_limit {
            return None;
        }
        let index = self.ready.pop_front()?;
        self.states[index] = VertexState::Running;
        self.in_flight += 1;
        debug!(index, in_flight = self.in_flight, "scheduler: dispatching vertex");
        Some(index)
    }

    /// Stop handing out new work. In-flight vertices still complete.
    pub fn request_stop(&mut self) {
        if !self.stop_requested {
            info!(
                in_flight = self.in_flight,
                "scheduler: stop requested; draining in-flight work"
            );
        }
        self.stop_requested = true;
    }

    /// Mark a running vertex as collected, release its token and enqueue
    /// successors whose last outstanding predecessor it was.
    pub fn complete(&mut self, index: usize) -> Result<SchedulerStep> {
        match self.states.get(index) {
            Some(VertexState::Running) => {}
            Some(other) => {
                return Err(DagsuiteError::SchedulerInvariant(format!(
                    "vertex #{index} completed while in state {other:?}"
                )));
            }
            None => {
                return Err(DagsuiteError::SchedulerInvariant(format!(
                    "completion for unknown vertex #{index}"
                )));
            }
        }

        self.states[index] = VertexState::Collected;
        self.in_flight -= 1;

        let mut newly_ready = Vec::new();
        for &succ in self.successors[index].iter() {
            self.outstanding[succ] -= 1;
            if self.outstanding[succ] == 0 && self.states[succ] == VertexState::Waiting {
                self.states[succ] = VertexState::Ready;
                self.ready.push_back(succ);
                newly_ready.push(succ);
            }
        }

        Ok(SchedulerStep {
            newly_ready,
            run_just_finished: self.is_drained(),
        })
    }

    /// Whether the run has nothing in flight and nothing left to dispatch.
    pub fn is_drained(&self) -> bool {
        self.in_flight == 0 && (self.stop_requested || self.ready.is_empty())
    }

    /// Indices of vertices that were never dispatched.
    pub fn undispatched(&self) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, VertexState::Waiting | VertexState::Ready))
            .map(|(i, _)| i)
            .collect()
    }

    /// Final consistency check once the run is drained.
    ///
    /// Without a stop request every vertex must have been collected; leftovers
    /// mean the graph was not validated correctly.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.stop_requested {
            return Ok(());
        }
        let leftovers: Vec<usize> = self
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_terminal())
            .map(|(i, _)| i)
            .collect();
        if leftovers.is_empty() {
            Ok(())
        } else {
            warn!(?leftovers, "scheduler: ready queue empty with vertices left");
            Err(DagsuiteError::SchedulerInvariant(format!(
                "{} vertices were never collected",
                leftovers.len()
            )))
        }
    }
}
