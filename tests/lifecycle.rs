mod common;

use common::RecordingHooks;
use workflow_engine::{Task, Workflow};

/// Scenario 1 from the design doc: a non-looping, 3-task workflow that
/// completes naturally produces exactly one `task_start`/`task_end` per
/// task, in order, followed by a single `iter_end`/`wf_end`.
#[test]
fn linear_completion_runs_tasks_in_order_once() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![Task::no_op("A"), Task::no_op("B"), Task::no_op("C")];
    let workflow = Workflow::new(tasks, "linear").with_hooks(hooks.clone());

    workflow.run();

    assert!(!workflow.is_running());
    assert_eq!(
        hooks.events(),
        vec![
            "wf_start",
            "iter_start(0)",
            "task_start(A)",
            "task_end(A)",
            "task_change(A,B)",
            "task_start(B)",
            "task_end(B)",
            "task_change(B,C)",
            "task_start(C)",
            "task_end(C)",
            "iter_end(0)",
            "task_change(C,none)",
            "wf_end",
        ]
    );
    assert_eq!(hooks.final_counts(), Some((3, 0)));
}

/// Invariant: a second `run()` call while one is already in progress is
/// rejected without disturbing the in-progress run.
#[test]
fn run_is_rejected_while_already_running() {
    common::init_logging();

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use workflow_engine::{StepResult, TaskBehavior, TaskContext};

    struct Slow;
    impl TaskBehavior for Slow {
        fn step(&mut self, ctx: &TaskContext) -> StepResult {
            ctx.wait(1.0)
        }
    }

    let hooks = RecordingHooks::new();
    let tasks = vec![Task::new("slow", Slow)];
    let workflow = Arc::new(Workflow::new(tasks, "rerun").with_hooks(hooks.clone()));
    workflow.start();
    thread::sleep(Duration::from_millis(30));

    // Calling run() directly on an already-running workflow must be a no-op:
    // it returns immediately without starting a second context.
    workflow.run();
    assert!(workflow.is_running());

    workflow.stop();
    workflow.join();
    assert!(!workflow.is_running());
    assert_eq!(hooks.events().iter().filter(|e| e.as_str() == "wf_start").count(), 1);
}
