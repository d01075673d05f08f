use std::sync::{Arc, Mutex, OnceLock};

use simplelog::{Config, LevelFilter, SimpleLogger};
use workflow_engine::{HookContext, Hooks, Task, TaskContext};

/// Installs a process-wide logger once so tests can be run with
/// `--nocapture` to see lifecycle log lines alongside assertions.
pub fn init_logging() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = SimpleLogger::init(LevelFilter::Debug, Config::default());
    });
}

/// A [`Hooks`] implementation that records every lifecycle event as a short
/// string, so tests can assert on the exact causal order spec'd in the
/// design doc's ordering guarantees.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    events: Arc<Mutex<Vec<String>>>,
    final_counts: Arc<Mutex<Option<(u64, u64)>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// `(tasks_executed, iteration)` as observed in the last `on_workflow_end`.
    pub fn final_counts(&self) -> Option<(u64, u64)> {
        *self.final_counts.lock().unwrap()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl Hooks for RecordingHooks {
    fn on_workflow_start(&self, _ctx: &HookContext) {
        self.push("wf_start");
    }

    fn on_workflow_end(&self, ctx: &HookContext) {
        self.push("wf_end");
        *self.final_counts.lock().unwrap() =
            Some((ctx.runtime.tasks_executed(), ctx.runtime.iteration()));
    }

    fn on_iteration_start(&self, iteration: u64, _ctx: &HookContext) {
        self.push(format!("iter_start({iteration})"));
    }

    fn on_iteration_end(&self, iteration: u64, _ctx: &HookContext) {
        self.push(format!("iter_end({iteration})"));
    }

    fn on_task_start(&self, task: &Task, _ctx: &TaskContext) {
        self.push(format!("task_start({})", task.name()));
    }

    fn on_task_end(&self, task: &Task, _ctx: &TaskContext) {
        self.push(format!("task_end({})", task.name()));
    }

    fn on_current_task_change(&self, prev: Option<&Task>, curr: Option<&Task>, _ctx: &HookContext) {
        let name = |t: Option<&Task>| t.map(|t| t.name().to_string()).unwrap_or_else(|| "none".to_string());
        self.push(format!("task_change({},{})", name(prev), name(curr)));
    }

    fn on_pause(&self, _ctx: &HookContext) {
        self.push("pause");
    }

    fn on_resume(&self, _ctx: &HookContext) {
        self.push("resume");
    }
}
