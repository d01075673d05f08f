/// Lifecycle states of a [`crate::Workflow`] run.
///
/// A [`crate::WorkflowContext`] exists if and only if the workflow is in one
/// of `Running`, `Paused`, or `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Running,
    Paused,
    Stopping,
}

impl WorkflowState {
    pub fn is_active(&self) -> bool {
        !matches!(self, WorkflowState::Idle)
    }
}
