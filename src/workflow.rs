use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use log::{error, info, warn};
use uuid::Uuid;

use crate::context::{HookContext, TaskContext, WorkflowContext, WorkflowMeta};
use crate::error::WorkflowError;
use crate::hooks::{Hooks, NoopHooks};
use crate::state::WorkflowState;
use crate::task::{ControlFlow, PauseGate, StopSignal, Task};
use crate::time::monotonic_seconds;

/// Normalizes a task index the way the original source's slice-style
/// validity check does: negative indices count back from the end of the
/// task sequence. Returns `None` if the index is out of range either way.
fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    if idx >= 0 {
        let idx = idx as usize;
        (idx < len).then_some(idx)
    } else {
        let offset = len as i64 + idx;
        (offset >= 0).then(|| offset as usize)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// RAII marker bracketing a single hook dispatch: records which thread is
/// currently running hook code (so a reentrant same-thread control call can
/// detect it *before* attempting to lock anything) and flips `Inner::in_hook`
/// for the duration, resetting both on drop even if the hook panics.
struct HookScope<'a> {
    hook_thread: &'a Mutex<Option<ThreadId>>,
    in_hook: &'a mut bool,
}

impl<'a> HookScope<'a> {
    fn enter(hook_thread: &'a Mutex<Option<ThreadId>>, in_hook: &'a mut bool) -> Self {
        *hook_thread.lock().unwrap() = Some(thread::current().id());
        *in_hook = true;
        HookScope { hook_thread, in_hook }
    }
}

impl Drop for HookScope<'_> {
    fn drop(&mut self) {
        *self.in_hook = false;
        *self.hook_thread.lock().unwrap() = None;
    }
}

/// The engine's locked mutable state. Every field here is touched only while
/// `Workflow::inner` is held.
struct Inner {
    state: WorkflowState,
    context: Option<WorkflowContext>,
    /// Created alongside `context` for the run; lets a task blocked in
    /// `TaskContext::wait` observe `pause`/`resume` without the driver
    /// thread (which is blocked inside `Task::run`) doing anything special.
    pause_gate: Option<PauseGate>,
    /// Set by a control call that has already redirected the current/next
    /// task pointer (and fired the matching `on_task_end`/`on_current_task_change`
    /// hooks itself); tells the driver loop to skip its own post-task
    /// bookkeeping for this cycle.
    extern_req: bool,
    /// Mirrors whether a hook callback is currently executing. Read by
    /// nothing outside this module; [`HookScope`] is what actually guards
    /// reentrancy, this just keeps the field spec §4.5 names visible on the
    /// type for anyone reading the state.
    in_hook: bool,
    /// Stop signal of the task currently executing, if any.
    current_stop_signal: Option<StopSignal>,
    /// True between a task's `on_task_start` and its matching `on_task_end`.
    task_end_pending: bool,
}

/// Driver loop, control API, and hook dispatch for a task sequence.
///
/// A `Workflow` is constructed once with its tasks, optional hooks, and loop
/// flag, then driven by calling [`Workflow::run`] (on the calling thread) or
/// [`Workflow::start`] (spawns a background thread). Any number of other
/// threads may call the control methods (`stop`, `next`, `jump_to`,
/// `end_iteration`, `pause`, `resume`, `toggle`) concurrently with the
/// driver; every one of them takes the same lock briefly and returns.
pub struct Workflow {
    tasks: Vec<Arc<Task>>,
    name: String,
    looping: bool,
    hooks: Arc<dyn Hooks>,
    inner: Mutex<Inner>,
    cvar: Condvar,
    hook_thread: Mutex<Option<ThreadId>>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl Workflow {
    /// Builds a workflow over `tasks`, defensively copied into the engine's
    /// own storage. Non-looping with no hooks by default; chain
    /// [`Workflow::loop_enabled`] / [`Workflow::with_hooks`] to change that.
    pub fn new(tasks: Vec<Task>, name: impl Into<String>) -> Self {
        Workflow {
            tasks: tasks.into_iter().map(Arc::new).collect(),
            name: name.into(),
            looping: false,
            hooks: Arc::new(NoopHooks),
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                context: None,
                pause_gate: None,
                extern_req: false,
                in_hook: false,
                current_stop_signal: None,
                task_end_pending: false,
            }),
            cvar: Condvar::new(),
            hook_thread: Mutex::new(None),
            runner: Mutex::new(None),
        }
    }

    pub fn loop_enabled(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().state.is_active()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().state == WorkflowState::Paused
    }

    /// Drives the workflow on the calling thread until it returns to
    /// [`WorkflowState::Idle`]. No-op (logged at warn) if a run is already
    /// in progress, and — like every other control operation — a no-op if
    /// called from inside a hook callback, since `init_run` would otherwise
    /// try to re-lock `self.inner` on the thread that's already holding it.
    pub fn run(&self) {
        if self.reentrancy_blocked("run") {
            return;
        }
        if !self.init_run() {
            return;
        }
        self.drive();
        self.cleanup_run();
    }

    /// Spawns a background thread that calls [`Workflow::run`]. Requires the
    /// workflow to be held behind an `Arc` since the spawned thread needs a
    /// `'static` handle to it.
    ///
    /// Checks `is_running`/the reentrancy guard under the lock *before*
    /// spawning, mirroring the original source's ordering: a redundant
    /// `start()` while a run is already in progress must never touch
    /// `self.runner`, since overwriting it here would clobber the still-live
    /// driver thread's `JoinHandle` and make a later `join()` return early
    /// against the wrong thread.
    pub fn start(self: &Arc<Self>) {
        if self.reentrancy_blocked("start") {
            return;
        }
        {
            let inner = self.inner.lock().unwrap();
            if inner.state != WorkflowState::Idle {
                warn!("{}start ignored: workflow is already running", self.prefix(&inner));
                return;
            }
        }
        let wf = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("workflow-{}", wf.name))
            .spawn(move || wf.run())
            .expect("failed to spawn workflow driver thread");
        *self.runner.lock().unwrap() = Some(handle);
    }

    /// Blocks until a background driver thread started via [`Workflow::start`]
    /// returns. No-op if the workflow was never `start`ed (or was driven via
    /// [`Workflow::run`] directly).
    pub fn join(&self) {
        let handle = self.runner.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn stop(&self) {
        if self.reentrancy_blocked("stop") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if !matches!(inner.state, WorkflowState::Running | WorkflowState::Paused) {
            warn!("{}stop ignored: workflow is not running", self.prefix(&inner));
            return;
        }
        self.end_current_task_locked(&mut inner);
        inner.extern_req = true;
        inner.state = WorkflowState::Stopping;
        info!("{}stop requested", self.prefix(&inner));
        self.cvar.notify_all();
    }

    pub fn next(&self) {
        if self.reentrancy_blocked("next") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state != WorkflowState::Running && inner.state != WorkflowState::Paused {
            warn!("{}next ignored: workflow is not active", self.prefix(&inner));
            return;
        }
        self.end_current_task_locked(&mut inner);
        let ctx = inner.context.as_ref().unwrap().clone();
        let len = self.tasks.len();
        let next_idx = ctx.with_runtime(|rt| rt.current_task_idx).map(|i| i + 1);
        match next_idx {
            Some(i) if i < len => self.advance_to_locked(&mut inner, Some(i)),
            _ => self.on_iteration_end_locked(&mut inner),
        }
        inner.extern_req = true;
        self.cvar.notify_all();
    }

    /// Redirects the current/next task pointer to `idx`. Negative indices
    /// are accepted as an offset from the end of the task sequence (the
    /// original source's slice convention). An out-of-range index is logged
    /// and the call is a no-op; it does not terminate the run.
    pub fn jump_to(&self, idx: i64, reset_transient: bool) {
        if self.reentrancy_blocked("jump_to") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state != WorkflowState::Running && inner.state != WorkflowState::Paused {
            warn!("{}jump_to ignored: workflow is not active", self.prefix(&inner));
            return;
        }
        let len = self.tasks.len();
        let target = match normalize_index(idx, len) {
            Some(target) => target,
            None => {
                error!(
                    "{}{}",
                    self.prefix(&inner),
                    WorkflowError::InvalidTaskJump { index: idx, len }
                );
                return;
            }
        };
        self.end_current_task_locked(&mut inner);
        if reset_transient {
            inner.context.as_ref().unwrap().reset_transient();
        }
        self.advance_to_locked(&mut inner, Some(target));
        inner.extern_req = true;
        self.cvar.notify_all();
    }

    pub fn end_iteration(&self) {
        if self.reentrancy_blocked("end_iteration") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state != WorkflowState::Running && inner.state != WorkflowState::Paused {
            warn!("{}end_iteration ignored: workflow is not active", self.prefix(&inner));
            return;
        }
        self.end_current_task_locked(&mut inner);
        self.on_iteration_end_locked(&mut inner);
        inner.extern_req = true;
        self.cvar.notify_all();
    }

    pub fn pause(&self) {
        if self.reentrancy_blocked("pause") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state != WorkflowState::Running {
            warn!("{}pause ignored: workflow is not running", self.prefix(&inner));
            return;
        }
        inner.state = WorkflowState::Paused;
        if let Some(gate) = &inner.pause_gate {
            gate.set_paused(true);
        }
        info!("{}paused", self.prefix(&inner));
        self.fire_hook(&mut inner, |h, c| h.on_pause(c));
        self.cvar.notify_all();
    }

    pub fn resume(&self) {
        if self.reentrancy_blocked("resume") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state != WorkflowState::Paused {
            warn!("{}resume ignored: workflow is not paused", self.prefix(&inner));
            return;
        }
        inner.state = WorkflowState::Running;
        if let Some(gate) = &inner.pause_gate {
            gate.set_paused(false);
        }
        info!("{}resumed", self.prefix(&inner));
        self.fire_hook(&mut inner, |h, c| h.on_resume(c));
        self.cvar.notify_all();
    }

    pub fn toggle(&self) {
        if self.reentrancy_blocked("toggle") {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            WorkflowState::Running => {
                inner.state = WorkflowState::Paused;
                if let Some(gate) = &inner.pause_gate {
                    gate.set_paused(true);
                }
                info!("{}paused (toggle)", self.prefix(&inner));
                self.fire_hook(&mut inner, |h, c| h.on_pause(c));
            }
            WorkflowState::Paused => {
                inner.state = WorkflowState::Running;
                if let Some(gate) = &inner.pause_gate {
                    gate.set_paused(false);
                }
                info!("{}resumed (toggle)", self.prefix(&inner));
                self.fire_hook(&mut inner, |h, c| h.on_resume(c));
            }
            _ => {
                warn!("{}toggle ignored: workflow is not active", self.prefix(&inner));
                return;
            }
        }
        self.cvar.notify_all();
    }

    // ---- internals ---------------------------------------------------

    fn prefix(&self, inner: &Inner) -> String {
        match &inner.context {
            Some(ctx) => format!("[{}({})] ", self.name, ctx.meta.run_id),
            None => format!("[{}] ", self.name),
        }
    }

    /// Detects a control call made from the same thread that is currently
    /// dispatching a hook, without ever attempting to lock `self.inner`
    /// (which would deadlock on a thread that already holds it).
    fn reentrancy_blocked(&self, op: &str) -> bool {
        let blocked = *self.hook_thread.lock().unwrap() == Some(thread::current().id());
        if blocked {
            warn!(
                "[{}] workflow.{op}() called from inside a hook callback; ignoring",
                self.name
            );
        }
        blocked
    }

    fn hook_context(&self, inner: &Inner) -> HookContext {
        inner
            .context
            .as_ref()
            .expect("hook fired without an active context")
            .make_hook_context(inner.state)
    }

    fn fire_hook(&self, inner: &mut Inner, f: impl FnOnce(&dyn Hooks, &HookContext)) {
        let ctx = self.hook_context(inner);
        let _scope = HookScope::enter(&self.hook_thread, &mut inner.in_hook);
        f(self.hooks.as_ref(), &ctx);
    }

    fn fire_task_hook(
        &self,
        inner: &mut Inner,
        task: &Task,
        tctx: &TaskContext,
        f: impl FnOnce(&dyn Hooks, &Task, &TaskContext),
    ) {
        let _scope = HookScope::enter(&self.hook_thread, &mut inner.in_hook);
        f(self.hooks.as_ref(), task, tctx);
    }

    fn task_context_locked(&self, inner: &Inner) -> TaskContext {
        let ctx = inner.context.as_ref().unwrap();
        let signal = inner
            .current_stop_signal
            .clone()
            .expect("task context requested with no task running");
        let gate = inner
            .pause_gate
            .clone()
            .expect("task context requested outside an active run");
        ctx.make_task_context(inner.state, signal, gate)
    }

    /// Stops the currently running task (if any) and, if its `on_task_end`
    /// has not already fired this cycle, fires it now. Idempotent: safe to
    /// call even when no task is running or it has already been ended.
    fn end_current_task_locked(&self, inner: &mut Inner) {
        if let Some(signal) = inner.current_stop_signal.clone() {
            signal.stop();
        }
        if !inner.task_end_pending {
            return;
        }
        let ctx = inner.context.as_ref().unwrap().clone();
        if let Some(idx) = ctx.with_runtime(|rt| rt.current_task_idx) {
            let task = self.tasks[idx].clone();
            let tctx = self.task_context_locked(inner);
            self.fire_task_hook(inner, &task, &tctx, |h, t, c| h.on_task_end(t, c));
        }
        ctx.with_runtime(|rt| {
            rt.tasks_executed += 1;
            rt.task_started_at = None;
        });
        inner.task_end_pending = false;
    }

    /// Bumps `current_task_idx`/`prev_task_idx` to `new_idx` and fires
    /// `on_current_task_change`.
    fn advance_to_locked(&self, inner: &mut Inner, new_idx: Option<usize>) {
        let ctx = inner.context.as_ref().unwrap().clone();
        let prev = ctx.with_runtime(|rt| {
            let prev = rt.current_task_idx;
            rt.prev_task_idx = prev;
            rt.current_task_idx = new_idx;
            prev
        });
        let prev_task = prev.map(|i| self.tasks[i].as_ref());
        let curr_task = new_idx.map(|i| self.tasks[i].as_ref());
        self.fire_hook(inner, move |h, c| h.on_current_task_change(prev_task, curr_task, c));
    }

    /// Fires `on_iteration_end`, then either wraps to iteration 0 of the
    /// next pass (if looping) or ends the run (if not).
    fn on_iteration_end_locked(&self, inner: &mut Inner) {
        let ctx = inner.context.as_ref().unwrap().clone();
        let iteration = ctx.with_runtime(|rt| rt.iteration);
        self.fire_hook(inner, move |h, c| h.on_iteration_end(iteration, c));

        if self.looping {
            let prev = ctx.with_runtime(|rt| {
                let prev = rt.current_task_idx;
                rt.prev_task_idx = prev;
                rt.current_task_idx = Some(0);
                rt.iteration += 1;
                prev
            });
            ctx.reset_transient();
            let new_iteration = ctx.with_runtime(|rt| rt.iteration);
            info!("{}iteration {} started", self.prefix(inner), new_iteration);
            self.fire_hook(inner, move |h, c| h.on_iteration_start(new_iteration, c));
            let prev_task = prev.map(|i| self.tasks[i].as_ref());
            let curr_task = self.tasks.first().map(|t| t.as_ref());
            self.fire_hook(inner, move |h, c| h.on_current_task_change(prev_task, curr_task, c));
        } else {
            let prev = ctx.with_runtime(|rt| {
                let prev = rt.current_task_idx;
                rt.prev_task_idx = prev;
                rt.current_task_idx = None;
                prev
            });
            let prev_task = prev.map(|i| self.tasks[i].as_ref());
            self.fire_hook(inner, move |h, c| h.on_current_task_change(prev_task, None, c));
            inner.state = WorkflowState::Stopping;
            info!("{}sequence complete, stopping", self.prefix(inner));
        }
    }

    /// Init phase: rejects a concurrent run, otherwise allocates a fresh
    /// context, moves to `RUNNING`, and fires `on_workflow_start` +
    /// `on_iteration_start(0)`.
    fn init_run(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            WorkflowState::Idle => {}
            WorkflowState::Stopping => {
                warn!(
                    "{}previous run is still cleaning up, cannot start a new run",
                    self.prefix(&inner)
                );
                return false;
            }
            _ => {
                warn!("{}workflow is already running", self.prefix(&inner));
                return false;
            }
        }

        let meta = WorkflowMeta {
            name: self.name.clone(),
            run_id: format!("{:08x}", (Uuid::new_v4().as_u128() & 0xFFFF_FFFF) as u32),
            started_at: monotonic_seconds(),
            looping: self.looping,
        };
        let ctx = WorkflowContext::new(meta);
        ctx.with_runtime(|rt| rt.current_task_idx = if self.tasks.is_empty() { None } else { Some(0) });
        inner.context = Some(ctx);
        inner.pause_gate = Some(PauseGate::new());
        inner.state = WorkflowState::Running;
        inner.extern_req = false;
        inner.task_end_pending = false;
        inner.current_stop_signal = None;

        info!("{}run started", self.prefix(&inner));
        self.fire_hook(&mut inner, |h, c| h.on_workflow_start(c));
        self.fire_hook(&mut inner, |h, c| h.on_iteration_start(0, c));
        true
    }

    /// The main loop: repeatedly runs the current task and reacts to how it
    /// ended, until the state leaves `RUNNING`/`PAUSED`.
    fn drive(&self) {
        'driver: loop {
            let (task, tctx) = {
                let mut inner = self.inner.lock().unwrap();
                loop {
                    match inner.state {
                        WorkflowState::Paused => {
                            inner = self.cvar.wait(inner).unwrap();
                        }
                        WorkflowState::Running => break,
                        _ => break 'driver,
                    }
                }

                let idx = match inner.context.as_ref().unwrap().with_runtime(|rt| rt.current_task_idx) {
                    Some(idx) => idx,
                    // Only reachable for a workflow constructed with zero
                    // tasks: there is no last task whose `on_task_end` would
                    // normally trigger `_on_iteration_end`, so do it here.
                    None => {
                        inner.state = WorkflowState::Stopping;
                        break 'driver;
                    }
                };

                let task = self.tasks[idx].clone();
                let signal = task.stop_signal();
                inner.current_stop_signal = Some(signal.clone());
                inner
                    .context
                    .as_ref()
                    .unwrap()
                    .with_runtime(|rt| rt.task_started_at = Some(monotonic_seconds()));
                inner.task_end_pending = true;
                let gate = inner.pause_gate.clone().unwrap();
                let tctx = inner
                    .context
                    .as_ref()
                    .unwrap()
                    .make_task_context(inner.state, signal, gate);
                self.fire_task_hook(&mut inner, &task, &tctx, |h, t, c| h.on_task_start(t, c));
                (task, tctx)
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(&tctx)));

            let mut inner = self.inner.lock().unwrap();

            if let Err(payload) = result {
                error!(
                    "{}task '{}' raised an error: {}",
                    self.prefix(&inner),
                    task.name(),
                    panic_message(payload.as_ref())
                );
                self.end_current_task_locked(&mut inner);
                inner.state = WorkflowState::Stopping;
                break;
            }

            if inner.state != WorkflowState::Running {
                break;
            }

            if inner.extern_req {
                inner.extern_req = false;
                continue;
            }

            self.end_current_task_locked(&mut inner);

            match task.control_flow() {
                ControlFlow::JumpTo(target) => {
                    let len = self.tasks.len();
                    match normalize_index(target, len) {
                        Some(t) => self.advance_to_locked(&mut inner, Some(t)),
                        None => {
                            error!(
                                "{}{}",
                                self.prefix(&inner),
                                WorkflowError::InvalidConditionalIndex { index: target, len }
                            );
                            inner.state = WorkflowState::Stopping;
                            break;
                        }
                    }
                }
                ControlFlow::Continue => {
                    let len = self.tasks.len();
                    let current = inner.context.as_ref().unwrap().with_runtime(|rt| rt.current_task_idx);
                    match current.map(|i| i + 1) {
                        Some(i) if i < len => self.advance_to_locked(&mut inner, Some(i)),
                        _ => self.on_iteration_end_locked(&mut inner),
                    }
                }
            }
        }
    }

    /// Teardown: fires `on_workflow_end`, then resets to `IDLE` with no
    /// context, matching invariant 2 (no cross-run leakage).
    fn cleanup_run(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.fire_hook(&mut inner, |h, c| h.on_workflow_end(c));
        info!("{}run finished", self.prefix(&inner));
        inner.context = None;
        inner.pause_gate = None;
        inner.state = WorkflowState::Idle;
        inner.extern_req = false;
        inner.task_end_pending = false;
        inner.current_stop_signal = None;
        self.cvar.notify_all();
    }
}
