mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::RecordingHooks;
use workflow_engine::{Task, Workflow};

/// Scenario 4: pausing mid-task blocks the driver at the condition
/// variable; the paused task does not observe an `on_task_end` until
/// `resume()` is called, and the task's total wall-clock reflects the pause.
#[test]
fn pause_blocks_task_completion_until_resume() {
    common::init_logging();

    let predicate_ready = Arc::new(AtomicBool::new(false));
    let flipper = predicate_ready.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        flipper.store(true, Ordering::SeqCst);
    });

    let hooks = RecordingHooks::new();
    let tasks = vec![Task::wait_until(
        "A",
        move |_ctx| predicate_ready.load(Ordering::SeqCst),
        0.02,
    )];
    let workflow = Arc::new(Workflow::new(tasks, "pause_resume").with_hooks(hooks.clone()));

    let task_began = Instant::now();
    workflow.start();

    thread::sleep(Duration::from_millis(50));
    workflow.pause();
    assert!(workflow.is_paused());

    thread::sleep(Duration::from_millis(450));
    assert!(
        !hooks.events().contains(&"task_end(A)".to_string()),
        "a paused task must not complete while the workflow is paused"
    );
    assert!(hooks.events().contains(&"pause".to_string()));

    workflow.resume();
    workflow.join();

    assert!(task_began.elapsed() >= Duration::from_millis(500));
    assert!(hooks.events().contains(&"resume".to_string()));
    assert!(hooks.events().contains(&"task_end(A)".to_string()));
}

/// `toggle()` flips RUNNING<->PAUSED and is rejected (no hook fired, no
/// state change) when the workflow is not active.
#[test]
fn toggle_is_a_no_op_when_workflow_is_idle() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![Task::no_op("solo")];
    let workflow = Workflow::new(tasks, "toggle_idle").with_hooks(hooks.clone());

    workflow.toggle();

    assert!(!workflow.is_running());
    assert!(hooks.events().is_empty());
}
