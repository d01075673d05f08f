//! An in-process, multi-threaded workflow execution engine.
//!
//! A [`Workflow`] drives a linear sequence of [`Task`]s through a lifecycle
//! of start, run, pause/resume, control-flow redirection (`next`/`jump_to`/
//! conditional branching), iteration looping, and clean shutdown, while
//! publishing lifecycle events to an optional [`Hooks`] observer and
//! exposing a scoped [`TaskContext`]/[`HookContext`] to tasks and hooks.
//!
//! The engine owns exactly one [`WorkflowContext`] per run and serializes
//! every control operation (`stop`, `next`, `jump_to`, `end_iteration`,
//! `pause`, `resume`, `toggle`) and every hook dispatch through a single
//! internal lock, so a foreground driver thread and any number of external
//! controller threads can manipulate the same run safely. Cancellation is
//! cooperative: a task observes its stop signal via
//! [`TaskContext::check_stopped`]/[`TaskContext::wait`] rather than being
//! preemptively killed.
//!
//! ```no_run
//! use std::sync::Arc;
//! use workflow_engine::{Task, Workflow};
//!
//! let tasks = vec![
//!     Task::no_op("warm_up"),
//!     Task::no_op("main_step"),
//! ];
//! let workflow = Arc::new(Workflow::new(tasks, "example"));
//! workflow.start();
//! workflow.join();
//! ```

mod context;
mod error;
mod hooks;
mod state;
mod task;
mod time;
mod workflow;

pub use context::{
    ContextMap, HookContext, HookRuntimeView, TaskContext, TaskRuntimeView, WorkflowContext,
    WorkflowMeta, WorkflowRuntime,
};
pub use error::{StepResult, TaskInterrupted, WorkflowError};
pub use hooks::{Hooks, NoopHooks};
pub use state::WorkflowState;
pub use task::{ControlFlow, StopSignal, Task, TaskBehavior};
pub use workflow::Workflow;
