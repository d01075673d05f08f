use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::error::StepResult;
use crate::state::WorkflowState;
use crate::task::{PauseGate, StopSignal};

/// Immutable per-run descriptor. Cheap to clone and share; never mutated
/// after a run starts.
#[derive(Debug, Clone)]
pub struct WorkflowMeta {
    pub name: String,
    pub run_id: String,
    pub started_at: f64,
    pub looping: bool,
}

/// Mutable per-run counters and pointers. Lives behind its own lock so a
/// task executing outside the engine's main lock can still be handed a
/// live view of it without contending with the driver.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRuntime {
    pub current_task_idx: Option<usize>,
    pub prev_task_idx: Option<usize>,
    pub iteration: u64,
    pub tasks_executed: u64,
    pub task_started_at: Option<f64>,
}

/// A shared, thread-safe string-keyed map of arbitrary JSON-shaped values,
/// used for the `persistent` and `transient` context maps. The engine never
/// inspects its contents; concurrent mutation across tasks/hooks is the
/// caller's responsibility.
#[derive(Debug, Clone, Default)]
pub struct ContextMap(Arc<Mutex<Map<String, Value>>>);

impl ContextMap {
    pub fn new() -> Self {
        ContextMap(Arc::new(Mutex::new(Map::new())))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.lock().unwrap().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.lock().unwrap().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.lock().unwrap().contains_key(key)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Snapshot the whole map. Useful for tests asserting on shape rather
    /// than individual keys.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.0.lock().unwrap().clone()
    }
}

/// Read-only view over [`WorkflowRuntime`] handed to a running task.
/// `task_started_at` is guaranteed present: a task is only ever handed one
/// of these while it is the currently-running task.
#[derive(Clone)]
pub struct TaskRuntimeView {
    inner: Arc<Mutex<WorkflowRuntime>>,
}

impl TaskRuntimeView {
    pub(crate) fn new(inner: Arc<Mutex<WorkflowRuntime>>) -> Self {
        TaskRuntimeView { inner }
    }

    pub fn current_task_idx(&self) -> Option<usize> {
        self.inner.lock().unwrap().current_task_idx
    }

    pub fn prev_task_idx(&self) -> Option<usize> {
        self.inner.lock().unwrap().prev_task_idx
    }

    pub fn iteration(&self) -> u64 {
        self.inner.lock().unwrap().iteration
    }

    pub fn tasks_executed(&self) -> u64 {
        self.inner.lock().unwrap().tasks_executed
    }

    /// Monotonic seconds at which the current task's `on_task_start` fired.
    ///
    /// Panics if accessed while no task is running — a guarded accessor for
    /// a programmer error, per the context-access-outside-a-run error kind.
    pub fn task_started_at(&self) -> f64 {
        self.inner
            .lock()
            .unwrap()
            .task_started_at
            .expect("task_started_at accessed outside a running task")
    }
}

/// Read-only view over [`WorkflowRuntime`] handed to hooks. Identical to
/// [`TaskRuntimeView`] except `task_started_at` is fallible: hooks may fire
/// outside task execution (e.g. `on_workflow_start`, `on_iteration_end`).
#[derive(Clone)]
pub struct HookRuntimeView {
    inner: Arc<Mutex<WorkflowRuntime>>,
}

impl HookRuntimeView {
    pub(crate) fn new(inner: Arc<Mutex<WorkflowRuntime>>) -> Self {
        HookRuntimeView { inner }
    }

    pub fn current_task_idx(&self) -> Option<usize> {
        self.inner.lock().unwrap().current_task_idx
    }

    pub fn prev_task_idx(&self) -> Option<usize> {
        self.inner.lock().unwrap().prev_task_idx
    }

    pub fn iteration(&self) -> u64 {
        self.inner.lock().unwrap().iteration
    }

    pub fn tasks_executed(&self) -> u64 {
        self.inner.lock().unwrap().tasks_executed
    }

    pub fn task_started_at(&self) -> Option<f64> {
        self.inner.lock().unwrap().task_started_at
    }
}

/// Engine-owned aggregate: the immutable descriptor plus the mutable
/// runtime and the two shared maps. Cheap to clone (every field is an `Arc`
/// or a plain value), so the engine can hand a context out to a task thread
/// without holding its own lock across task execution.
#[derive(Clone)]
pub struct WorkflowContext {
    pub meta: Arc<WorkflowMeta>,
    runtime: Arc<Mutex<WorkflowRuntime>>,
    pub persistent: ContextMap,
    pub transient: ContextMap,
}

impl WorkflowContext {
    pub fn new(meta: WorkflowMeta) -> Self {
        WorkflowContext {
            meta: Arc::new(meta),
            runtime: Arc::new(Mutex::new(WorkflowRuntime::default())),
            persistent: ContextMap::new(),
            transient: ContextMap::new(),
        }
    }

    pub(crate) fn runtime_handle(&self) -> Arc<Mutex<WorkflowRuntime>> {
        self.runtime.clone()
    }

    pub(crate) fn with_runtime<R>(&self, f: impl FnOnce(&mut WorkflowRuntime) -> R) -> R {
        f(&mut self.runtime.lock().unwrap())
    }

    pub(crate) fn make_task_context(
        &self,
        state: WorkflowState,
        stop_signal: StopSignal,
        pause_gate: PauseGate,
    ) -> TaskContext {
        TaskContext {
            meta: self.meta.clone(),
            runtime: TaskRuntimeView::new(self.runtime.clone()),
            persistent: self.persistent.clone(),
            transient: self.transient.clone(),
            state,
            stop_signal,
            pause_gate,
        }
    }

    pub fn make_hook_context(&self, state: WorkflowState) -> HookContext {
        HookContext {
            meta: self.meta.clone(),
            runtime: HookRuntimeView::new(self.runtime.clone()),
            persistent: self.persistent.clone(),
            transient: self.transient.clone(),
            state,
        }
    }

    pub fn reset_transient(&self) {
        self.transient.clear();
    }

    pub fn reset_all(&self) {
        *self.runtime.lock().unwrap() = WorkflowRuntime::default();
        self.persistent.clear();
        self.transient.clear();
    }
}

/// Execution-context view handed to a running task's `on_start`/`step`/
/// `on_end`. Gives mutable access to `persistent`/`transient` (they are
/// communication channels by design) and read-only access to everything
/// else.
#[derive(Clone)]
pub struct TaskContext {
    pub meta: Arc<WorkflowMeta>,
    pub runtime: TaskRuntimeView,
    pub persistent: ContextMap,
    pub transient: ContextMap,
    state: WorkflowState,
    stop_signal: StopSignal,
    pause_gate: PauseGate,
}

impl TaskContext {
    /// Snapshot of the workflow state at the moment this context was handed
    /// to the task. Does not track later `pause`/`resume` calls; use
    /// [`TaskContext::is_paused`] for that.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Live view of whether the workflow is currently paused, unlike
    /// [`TaskContext::state`]'s point-in-time snapshot.
    pub fn is_paused(&self) -> bool {
        self.pause_gate.is_paused()
    }

    /// Raises [`crate::TaskInterrupted`] if this task's stop flag has
    /// already been signalled.
    pub fn check_stopped(&self) -> StepResult {
        self.stop_signal.check_stopped()
    }

    /// Sleeps up to `seconds`, returning early (and raising
    /// [`crate::TaskInterrupted`]) if the stop flag is signalled first. Also
    /// acts as this task's pause point: if the workflow is `PAUSED` when the
    /// sleep would otherwise return, blocks until `resume`/`toggle` (or
    /// `stop`, which still raises `TaskInterrupted`).
    pub fn wait(&self, seconds: f64) -> StepResult {
        self.stop_signal.wait(seconds)?;
        self.pause_gate.wait_while_paused(&self.stop_signal)
    }
}

/// Execution-context view handed to hook callbacks.
#[derive(Clone)]
pub struct HookContext {
    pub meta: Arc<WorkflowMeta>,
    pub runtime: HookRuntimeView,
    pub persistent: ContextMap,
    pub transient: ContextMap,
    state: WorkflowState,
}

impl HookContext {
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, WorkflowState::Paused)
    }
}
