use std::fmt;

/// Errors the engine surfaces through logging rather than by terminating a
/// call. Carried as a typed value so callers and tests can match on the kind
/// rather than parsing log text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// An external thread requested `jump_to` with an index outside
    /// `-len..len`. The workflow continues unchanged.
    #[error("invalid task jump requested: index {index} out of range for {len} tasks")]
    InvalidTaskJump { index: i64, len: usize },

    /// A `ConditionalTask` produced an out-of-range branch index. This one is
    /// fatal to the run: the driver logs it and stops the workflow.
    #[error("conditional task produced invalid index {index} for {len} tasks")]
    InvalidConditionalIndex { index: i64, len: usize },
}

/// Sentinel raised by the cooperative primitives ([`crate::TaskContext::check_stopped`],
/// [`crate::TaskContext::wait`]) to unwind a task's `step` loop when its stop
/// flag has been signalled. Never surfaced to callers of the public API; the
/// driver catches it the same way it catches any other task-body error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskInterrupted;

impl fmt::Display for TaskInterrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task was interrupted by a stop signal")
    }
}

impl std::error::Error for TaskInterrupted {}

/// Result alias for task bodies using the cooperative primitives.
pub type StepResult = Result<(), TaskInterrupted>;
