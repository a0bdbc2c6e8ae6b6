// src/dag/vertex_state.rs

//! Per-run state of a graph vertex inside the scheduler.

/// Lifecycle of a vertex during one scheduler run.
///
/// Transitions are strictly forward:
/// `Waiting -> Ready -> Running -> Collected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexState {
    /// At least one predecessor has not been collected yet.
    Waiting,
    /// All predecessors collected; queued for dispatch.
    Ready,
    /// Dispatched and holding a token.
    Running,
    /// Completed and passed through `collect`.
    Collected,
}

impl VertexState {
    pub fn is_terminal(self) -> bool {
        matches!(self, VertexState::Collected)
    }
}
