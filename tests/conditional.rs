mod common;

use common::RecordingHooks;
use workflow_engine::{Task, Workflow};

/// Scenario 3: a `ConditionalTask` whose predicate is true jumps straight to
/// its `then_idx`, and the skipped branch never receives `on_task_start`.
#[test]
fn conditional_task_branches_to_target_and_skips_else() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![
        Task::conditional("cond", |_ctx| true, 2, Some(1)),
        Task::no_op("skip"),
        Task::no_op("target"),
    ];
    let workflow = Workflow::new(tasks, "conditional").with_hooks(hooks.clone());
    workflow.run();

    let events = hooks.events();
    assert!(events.contains(&"task_start(cond)".to_string()));
    assert!(events.contains(&"task_start(target)".to_string()));
    assert!(!events.contains(&"task_start(skip)".to_string()));
}

/// The `else_idx` branch is taken when the predicate is false.
#[test]
fn conditional_task_takes_else_branch_when_predicate_is_false() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![
        Task::conditional("cond", |_ctx| false, 2, Some(1)),
        Task::no_op("else_target"),
        Task::no_op("then_target"),
    ];
    let workflow = Workflow::new(tasks, "conditional_else").with_hooks(hooks.clone());
    workflow.run();

    let events = hooks.events();
    assert!(events.contains(&"task_start(else_target)".to_string()));
    assert!(!events.contains(&"task_start(then_target)".to_string()));
}

/// With no `else_idx` and a false predicate, the driver falls through to its
/// normal next-index advance rather than jumping.
#[test]
fn conditional_task_falls_through_without_an_else_branch() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![
        Task::conditional("cond", |_ctx| false, 5, None),
        Task::no_op("next_in_sequence"),
    ];
    let workflow = Workflow::new(tasks, "conditional_fallthrough").with_hooks(hooks.clone());
    workflow.run();

    assert!(hooks.events().contains(&"task_start(next_in_sequence)".to_string()));
}

/// A `ConditionalTask` producing an out-of-range index is fatal to the run
/// (spec §7 item 3): the workflow stops rather than panicking the process.
#[test]
fn conditional_task_invalid_index_stops_the_workflow() {
    common::init_logging();

    let hooks = RecordingHooks::new();
    let tasks = vec![
        Task::conditional("cond", |_ctx| true, 99, None),
        Task::no_op("unreachable"),
    ];
    let workflow = Workflow::new(tasks, "conditional_invalid").with_hooks(hooks.clone());
    workflow.run();

    assert!(!workflow.is_running());
    let events = hooks.events();
    assert!(events.contains(&"task_end(cond)".to_string()));
    assert!(!events.contains(&"task_start(unreachable)".to_string()));
    assert!(events.last() == Some(&"wf_end".to_string()));
}
