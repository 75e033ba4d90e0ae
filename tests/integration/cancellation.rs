//! Cancellation across flows, controllers and owners

use std::sync::mpsc;
use std::sync::Arc;

use flowrt::runtime::apartment::{SharedApartment, ThreadPoolApartment};
use flowrt::runtime::context::ExecutionContext;
use flowrt::runtime::controller::Controller;
use flowrt::runtime::error::FlowResult;
use flowrt::runtime::flow::{FlowStatus, TaskFlow, TaskStatus};
use flowrt::runtime::value::AnyValue;

fn pool() -> SharedApartment {
    Arc::new(ThreadPoolApartment::with_workers(2).unwrap())
}

fn noop(_: AnyValue) -> FlowResult<AnyValue> {
    Ok(AnyValue::empty())
}

#[test]
fn test_try_cancel_skips_queued_tasks() {
    let flow = TaskFlow::with_apartment(pool());
    let (started_tx, started_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();

    flow.add_task(
        "extract",
        move |_| -> FlowResult<AnyValue> {
            started_tx.send(()).unwrap();
            go_rx.recv().unwrap();
            Ok(AnyValue::new(3u32))
        },
        ExecutionContext::new(),
    )
    .unwrap();
    flow.add_task("transform:extract", noop, ExecutionContext::new())
        .unwrap();
    flow.add_task("load:transform", noop, ExecutionContext::new())
        .unwrap();

    flow.start().unwrap();
    started_rx.recv().unwrap();
    flow.try_cancel();
    go_tx.send(()).unwrap();

    assert_eq!(flow.wait(), FlowStatus::Failed);
    assert!(flow.is_cancel_requested());
    assert_eq!(flow.task_status("extract"), Some(TaskStatus::Succeeded));
    assert_eq!(flow.failed_task_name().as_deref(), Some("transform"));
    assert!(flow.last_error().unwrap().is_cancellation());
    assert!(flow.task_result("load").unwrap().unwrap_err().is_cancellation());
}

#[test]
fn test_cancelled_controller_fails_its_task_only() {
    let controller = Controller::new();
    let flow = TaskFlow::with_apartment(pool());
    flow.add_task("kept", noop, ExecutionContext::new()).unwrap();
    flow.add_task(
        "dropped",
        noop,
        ExecutionContext::new().with_controller(&controller),
    )
    .unwrap();

    controller.cancel();
    flow.start().unwrap();

    assert_eq!(flow.wait(), FlowStatus::Failed);
    assert_eq!(flow.task_status("kept"), Some(TaskStatus::Succeeded));
    assert_eq!(flow.task_status("dropped"), Some(TaskStatus::Failed));
    assert_eq!(flow.failed_task_name().as_deref(), Some("dropped"));
}

#[test]
fn test_expired_owner_skips_evaluator() {
    let owner = Arc::new(String::from("session"));
    let flow = TaskFlow::with_apartment(pool());
    let (ran_tx, ran_rx) = mpsc::channel::<()>();
    flow.add_task(
        "refresh",
        move |_| -> FlowResult<AnyValue> {
            ran_tx.send(()).unwrap();
            Ok(AnyValue::empty())
        },
        ExecutionContext::new().with_weak_owner(&owner),
    )
    .unwrap();

    drop(owner);
    flow.start().unwrap();

    assert_eq!(flow.wait(), FlowStatus::Failed);
    assert!(ran_rx.try_recv().is_err());
    assert!(flow.last_error().unwrap().is_cancellation());
}

#[test]
fn test_child_controller_follows_parent() {
    let parent = Controller::new();
    let child = parent.child();
    let flow = TaskFlow::with_apartment(pool());
    flow.add_task("a", noop, ExecutionContext::new().with_controller(&child))
        .unwrap();

    parent.cancel();
    assert!(child.is_cancelled());
    flow.start().unwrap();
    assert_eq!(flow.wait(), FlowStatus::Failed);
}
