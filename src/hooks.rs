use crate::context::HookContext;
use crate::task::Task;

/// Lifecycle observer. Every method defaults to a no-op, so implementers
/// only override the events they care about.
///
/// All methods run synchronously on the thread that triggered the event,
/// while the engine's internal lock is held — see the engine module's
/// `in_hook` reentrancy guard. A hook must never call back into the
/// workflow's control API (`run`, `start`, `stop`, `next`, `jump_to`,
/// `end_iteration`, `pause`, `resume`, `toggle`); such calls are logged and
/// ignored rather than deadlocking.
pub trait Hooks: Send + Sync {
    fn on_workflow_start(&self, _ctx: &HookContext) {}
    fn on_workflow_end(&self, _ctx: &HookContext) {}
    fn on_iteration_start(&self, _iteration: u64, _ctx: &HookContext) {}
    fn on_iteration_end(&self, _iteration: u64, _ctx: &HookContext) {}
    fn on_task_start(&self, _task: &Task, _ctx: &crate::context::TaskContext) {}
    fn on_task_end(&self, _task: &Task, _ctx: &crate::context::TaskContext) {}
    fn on_current_task_change(&self, _prev: Option<&Task>, _curr: Option<&Task>, _ctx: &HookContext) {}
    fn on_pause(&self, _ctx: &HookContext) {}
    fn on_resume(&self, _ctx: &HookContext) {}
}

/// The default hooks object used when a workflow is constructed without one.
pub struct NoopHooks;

impl Hooks for NoopHooks {}
