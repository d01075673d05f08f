use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::context::TaskContext;
use crate::error::{StepResult, TaskInterrupted};

/// Delay between `step` invocations that return without raising
/// `TaskInterrupted`, to avoid spinning a thread flat-out for task bodies
/// that never call `check_stopped`/`wait` themselves.
const STEP_IDLE_DELAY: Duration = Duration::from_millis(10);

/// A waitable stop flag shared between a task's body and whatever thread
/// signals it to stop. Independent of the engine's own lock so a controller
/// thread can signal a task without contending for it, matching the
/// "task's own stop flag is an independent, thread-safe signal" requirement.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// A fresh signal is `stopped` (not running), matching a task's initial
    /// state before its first `run`.
    pub fn new() -> Self {
        StopSignal {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub(crate) fn start(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Idempotent, thread-safe, non-blocking.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = false;
        cvar.notify_all();
    }

    pub fn is_running(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }

    pub fn check_stopped(&self) -> StepResult {
        if self.is_running() {
            Ok(())
        } else {
            Err(TaskInterrupted)
        }
    }

    pub fn wait(&self, seconds: f64) -> StepResult {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        let (guard, _timeout) = cvar
            .wait_timeout_while(guard, Duration::from_secs_f64(seconds.max(0.0)), |running| *running)
            .unwrap();
        if *guard {
            Ok(())
        } else {
            Err(TaskInterrupted)
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::new()
    }
}

/// How long [`PauseGate::wait_while_paused`] blocks between checks of the
/// stop signal while the workflow is paused. Bounds how quickly a paused,
/// cooperatively-waiting task notices an external `stop()`.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared per-run signal that lets [`crate::TaskContext::wait`] act as a
/// task's pause point as well as its stop point: a task that calls `wait`
/// while the workflow is `PAUSED` blocks there until `resume`/`toggle` or
/// `stop` is called, in addition to the ordinary sleep/stop behavior.
/// Without this, pausing a workflow mid-task would have no effect until the
/// task happened to finish on its own, since a single driver thread runs
/// `Task::run` synchronously and has no other point to intervene.
#[derive(Clone)]
pub(crate) struct PauseGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PauseGate {
    pub fn new() -> Self {
        PauseGate {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = paused;
        cvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }

    /// Blocks while the gate is paused, waking periodically to check
    /// `stop_signal` so an external `stop()` during a pause is still
    /// observed promptly. Returns `Err(TaskInterrupted)` if stopped while
    /// waiting, `Ok(())` once the gate is no longer paused.
    pub fn wait_while_paused(&self, stop_signal: &StopSignal) -> StepResult {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        while *guard {
            if !stop_signal.is_running() {
                return Err(TaskInterrupted);
            }
            let (next, _timeout) = cvar.wait_timeout(guard, PAUSE_POLL_INTERVAL).unwrap();
            guard = next;
        }
        stop_signal.check_stopped()
    }
}

/// Decision a task's `step` can make about where control goes next, in
/// place of the original design's engine-inspected `next_task_idx` field.
/// `Continue` advances the driver through its normal next/jump logic;
/// `JumpTo` redirects it directly, used by [`ConditionalBehavior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    JumpTo(i64),
}

/// Override points for a task body. `step` is required; `on_start`/`on_end`
/// default to no-ops. Implemented by user task bodies as well as the
/// built-in variants below.
///
/// `control_flow` is consulted once after a `step` loop ends (stop flag
/// observed) via the driver's post-task-end logic; only [`ConditionalBehavior`]
/// overrides it to request a jump.
pub trait TaskBehavior: Send {
    fn on_start(&mut self, _ctx: &TaskContext) {}
    fn on_end(&mut self, _ctx: &TaskContext) {}
    fn step(&mut self, ctx: &TaskContext) -> StepResult;

    fn control_flow(&self) -> ControlFlow {
        ControlFlow::Continue
    }
}

/// A reusable, polymorphic unit of work. Not concurrently reusable: the
/// engine only ever runs one task at a time by construction, but a `Task`
/// instance must not be handed to two workflows simultaneously.
pub struct Task {
    name: String,
    stop_signal: StopSignal,
    behavior: Mutex<Box<dyn TaskBehavior>>,
}

impl Task {
    pub fn new(name: impl Into<String>, behavior: impl TaskBehavior + 'static) -> Self {
        Task {
            name: name.into(),
            stop_signal: StopSignal::new(),
            behavior: Mutex::new(Box::new(behavior)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.stop_signal.is_running()
    }

    pub fn stop(&self) {
        self.stop_signal.stop();
    }

    pub(crate) fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Runs `on_start`, then repeatedly invokes `step` until the stop flag
    /// is signalled or `step` raises [`TaskInterrupted`]. `on_end` always
    /// runs, even on panic. The stop flag is flipped to `running` on entry
    /// and back to `stopped` on exit regardless of how the loop ended.
    ///
    /// A panic from the task body is caught so `on_end` still runs, then
    /// resumed, so the driver's own `catch_unwind` around `Task::run` still
    /// observes it and can log + stop the workflow.
    pub(crate) fn run(&self, ctx: &TaskContext) {
        self.stop_signal.start();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut behavior = self.behavior.lock().unwrap();
            behavior.on_start(ctx);
            loop {
                if self.stop_signal.check_stopped().is_err() {
                    break;
                }
                match behavior.step(ctx) {
                    Ok(()) => std::thread::sleep(STEP_IDLE_DELAY),
                    Err(TaskInterrupted) => break,
                }
            }
            behavior.on_end(ctx);
        }));
        self.stop_signal.stop();
        if let Err(payload) = result {
            panic::resume_unwind(payload);
        }
    }

    pub(crate) fn control_flow(&self) -> ControlFlow {
        self.behavior.lock().unwrap().control_flow()
    }

    /// An explicit pause barrier in a sequence: blocks until stopped, then
    /// ends. Useful as a placeholder slot that a controller drives forward
    /// with `next`/`jump_to` rather than letting it complete naturally.
    pub fn checkpoint(name: impl Into<String>) -> Self {
        Task::new(name, CheckpointBehavior)
    }

    /// A zero-work slot: ends immediately without ever entering `step`'s
    /// blocking form.
    pub fn no_op(name: impl Into<String>) -> Self {
        Task::new(name, NoOpBehavior)
    }

    /// Evaluates `predicate` once, then requests a jump to `then_idx` or
    /// `else_idx` (if given) via [`ControlFlow::JumpTo`]. If `predicate`
    /// returns `false` and no `else_idx` was given, the driver falls through
    /// to its normal next-index advance.
    pub fn conditional(
        name: impl Into<String>,
        predicate: impl Fn(&TaskContext) -> bool + Send + 'static,
        then_idx: i64,
        else_idx: Option<i64>,
    ) -> Self {
        Task::new(
            name,
            ConditionalBehavior {
                predicate: Box::new(predicate),
                then_idx,
                else_idx,
                chosen: None,
            },
        )
    }

    /// Polls `predicate` every `poll_interval` seconds until it returns
    /// `true`, then ends.
    pub fn wait_until(
        name: impl Into<String>,
        predicate: impl Fn(&TaskContext) -> bool + Send + 'static,
        poll_interval: f64,
    ) -> Self {
        Task::new(
            name,
            WaitUntilBehavior {
                predicate: Box::new(predicate),
                poll_interval,
            },
        )
    }
}

/// `step` blocks until stop is signalled, then raises `TaskInterrupted`.
struct CheckpointBehavior;

impl TaskBehavior for CheckpointBehavior {
    fn step(&mut self, ctx: &TaskContext) -> StepResult {
        // Bounded wait: the surrounding `Task::run` loop calls `step` again
        // immediately on `Ok`, so this just re-arms the wait until stopped.
        ctx.wait(3600.0)
    }
}

/// `step` raises `TaskInterrupted` immediately.
struct NoOpBehavior;

impl TaskBehavior for NoOpBehavior {
    fn step(&mut self, _ctx: &TaskContext) -> StepResult {
        Err(TaskInterrupted)
    }
}

/// Evaluates its predicate once per run and records the chosen branch for
/// the driver to read via [`TaskBehavior::control_flow`] after the task
/// ends.
struct ConditionalBehavior {
    predicate: Box<dyn Fn(&TaskContext) -> bool + Send>,
    then_idx: i64,
    else_idx: Option<i64>,
    chosen: Option<i64>,
}

impl TaskBehavior for ConditionalBehavior {
    fn step(&mut self, ctx: &TaskContext) -> StepResult {
        let branch = if (self.predicate)(ctx) {
            Some(self.then_idx)
        } else {
            self.else_idx
        };
        self.chosen = branch;
        Err(TaskInterrupted)
    }

    fn control_flow(&self) -> ControlFlow {
        match self.chosen {
            Some(idx) => ControlFlow::JumpTo(idx),
            None => ControlFlow::Continue,
        }
    }
}

/// Polls its predicate on an interval until it is satisfied.
struct WaitUntilBehavior {
    predicate: Box<dyn Fn(&TaskContext) -> bool + Send>,
    poll_interval: f64,
}

impl TaskBehavior for WaitUntilBehavior {
    fn step(&mut self, ctx: &TaskContext) -> StepResult {
        if (self.predicate)(ctx) {
            Err(TaskInterrupted)
        } else {
            ctx.wait(self.poll_interval)
        }
    }
}
