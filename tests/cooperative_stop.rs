mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::RecordingHooks;
use workflow_engine::{StepResult, Task, TaskBehavior, TaskContext, Workflow};

/// A task body that sleeps far longer than any test should take, relying
/// entirely on `stop()` to interrupt it.
struct LongSleeper;

impl TaskBehavior for LongSleeper {
    fn step(&mut self, ctx: &TaskContext) -> StepResult {
        ctx.wait(10.0)
    }
}

/// Scenario 5: a task blocked in `wait(10.0)` is interrupted promptly by an
/// external `stop()`, and the workflow reaches IDLE without firing any
/// further hooks.
#[test]
fn stop_interrupts_a_sleeping_task_promptly() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![Task::new("sleeper", LongSleeper)];
    let workflow = Arc::new(Workflow::new(tasks, "cooperative_stop").with_hooks(hooks.clone()));
    workflow.start();

    thread::sleep(Duration::from_millis(20));
    let stop_requested_at = Instant::now();
    workflow.stop();
    workflow.join();

    assert!(
        stop_requested_at.elapsed() < Duration::from_millis(100),
        "join() should return shortly after stop(), not after the full 10s sleep"
    );
    assert!(!workflow.is_running());

    let events = hooks.events();
    assert!(events.contains(&"task_end(sleeper)".to_string()));
    assert_eq!(events.last(), Some(&"wf_end".to_string()));
}

/// `is_running()` is idempotent to observe across multiple controller
/// threads, and `stop()` called twice is a harmless no-op the second time.
#[test]
fn stop_is_idempotent() {
    common::init_logging();

    let tasks = vec![Task::new("sleeper", LongSleeper)];
    let workflow = Arc::new(Workflow::new(tasks, "double_stop"));
    workflow.start();
    thread::sleep(Duration::from_millis(20));

    workflow.stop();
    workflow.stop();
    workflow.join();

    assert!(!workflow.is_running());
}
