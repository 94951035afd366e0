//! Manager dispatch, reconciliation and restart against scripted workers.

mod common;

use std::sync::atomic::Ordering;

use cube::manager::{Assignments, Manager, ManagerError};
use cube::tasks::types::{QueueItem, State, Task, TaskEvent};

use common::{StubWorker, dead_address, manager};

fn submission(name: &str) -> TaskEvent {
    TaskEvent::new(State::Scheduled, Task::new(name, "nginx"))
}

/// Runs one dispatch against the stub and returns the task as tracked.
async fn dispatched(manager: &Manager, event: TaskEvent) -> Task {
    manager.add_task(QueueItem::Event(event)).await;
    manager.send_work().await.unwrap().unwrap()
}

#[tokio::test]
async fn dispatch_on_empty_queue_does_nothing() {
    let (stub, address) = StubWorker::start().await;
    let manager = manager(vec![address]);

    let sent = manager.send_work().await.unwrap();

    assert!(sent.is_none());
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
    assert!(manager.get_tasks().await.is_empty());
    assert_eq!(manager.assignments().await, Assignments::new(&manager.workers));
}

#[tokio::test]
async fn dispatch_schedules_and_assigns() {
    let (stub, address) = StubWorker::start().await;
    let manager = manager(vec![address.clone()]);
    let mut event = submission("web");
    event.task.state = State::Pending;
    let task_id = event.task.id;

    let task = dispatched(&manager, event.clone()).await;

    assert_eq!(task.state, State::Scheduled);
    assert_eq!(manager.get_task(task_id).await.unwrap().state, State::Scheduled);
    assert_eq!(manager.worker_for(task_id).await.as_deref(), Some(address.as_str()));
    assert!(manager.assignments().await.tasks_for(&address).unwrap().contains(&task_id));
    assert_eq!(manager.pending_len().await, 0);

    let received = stub.events();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, event.id);
    assert_eq!(received[0].task.state, State::Scheduled);
    assert!(manager.get_event(event.id).await.is_some());
}

#[tokio::test]
async fn unreachable_worker_requeues_event_once() {
    let address = dead_address().await;
    let manager = manager(vec![address.clone()]);
    let event = submission("u1");
    let task_id = event.task.id;
    manager.add_task(QueueItem::Event(event.clone())).await;

    let err = manager.send_work().await.unwrap_err();
    assert!(err.is_transport());
    let assigned = manager.assignments().await;

    let pending = manager.pending_items().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_id(), task_id);
    assert_eq!(manager.worker_for(task_id).await.as_deref(), Some(address.as_str()));

    // A second failed attempt neither duplicates the event nor moves it.
    assert!(manager.send_work().await.unwrap_err().is_transport());
    assert_eq!(manager.pending_len().await, 1);
    assert_eq!(manager.assignments().await, assigned);
}

#[tokio::test]
async fn requeued_event_goes_back_to_the_same_worker() {
    let dead = dead_address().await;
    let (stub, live) = StubWorker::start().await;
    let manager = manager(vec![dead.clone(), live]);
    let event = submission("web");
    manager.add_task(QueueItem::Event(event.clone())).await;

    assert!(manager.send_work().await.is_err());
    assert!(manager.send_work().await.is_err());

    assert_eq!(manager.worker_for(event.task.id).await.as_deref(), Some(dead.as_str()));
    assert!(stub.events().is_empty());
}

#[tokio::test]
async fn rejected_event_is_dropped() {
    let (stub, address) = StubWorker::start().await;
    stub.reject.store(true, Ordering::SeqCst);
    let manager = manager(vec![address]);
    manager.add_task(QueueItem::Event(submission("web"))).await;

    let err = manager.send_work().await.unwrap_err();

    assert!(matches!(
        err,
        ManagerError::WorkerRejected { status: 500, ref message, .. } if message == "disk full"
    ));
    assert_eq!(manager.pending_len().await, 0);
}

#[tokio::test]
async fn dispatch_round_robins_new_tasks() {
    let (first, a) = StubWorker::start().await;
    let (second, b) = StubWorker::start().await;
    let manager = manager(vec![a, b]);

    for name in ["one", "two", "three", "four"] {
        dispatched(&manager, submission(name)).await;
    }

    assert_eq!(first.events().len(), 2);
    assert_eq!(second.events().len(), 2);
}

#[tokio::test]
async fn stop_event_follows_existing_assignment() {
    let (first, a) = StubWorker::start().await;
    let (second, b) = StubWorker::start().await;
    let manager = manager(vec![a, b]);
    let task = dispatched(&manager, submission("web")).await;

    let mut stopping = task.clone();
    stopping.state = State::Completed;
    manager
        .add_task(QueueItem::Event(TaskEvent::new(State::Completed, stopping)))
        .await;
    manager.send_work().await.unwrap();

    assert_eq!(first.events().len(), 2);
    assert_eq!(first.events()[1].state, State::Completed);
    assert!(second.events().is_empty());
}

#[tokio::test]
async fn reconciliation_skips_untracked_tasks_and_continues() {
    let (stub, address) = StubWorker::start().await;
    let manager = manager(vec![address]);
    let tracked = dispatched(&manager, submission("web")).await;

    let stranger = Task::new("stranger", "redis");
    let mut running = tracked.clone();
    running.state = State::Running;
    running.container_id = Some("abc123".to_string());
    running.start_time = Some(chrono::Utc::now());
    running.host_ports.insert("80/tcp".to_string(), "49153".to_string());
    stub.report(vec![stranger.clone(), running.clone()]);

    let updated = manager.update_tasks().await;

    assert_eq!(updated, 1);
    assert!(manager.get_task(stranger.id).await.is_none());
    let local = manager.get_task(tracked.id).await.unwrap();
    assert_eq!(local.state, State::Running);
    assert_eq!(local.container_id.as_deref(), Some("abc123"));
    assert_eq!(local.start_time, running.start_time);
    assert_eq!(local.host_port(), Some("49153"));
}

#[tokio::test]
async fn reconciliation_skips_unreachable_workers() {
    let dead = dead_address().await;
    let (stub, live) = StubWorker::start().await;
    let manager = manager(vec![live.clone(), dead]);
    let tracked = dispatched(&manager, submission("web")).await;

    let mut failed = tracked.clone();
    failed.state = State::Failed;
    stub.report(vec![failed]);

    assert_eq!(manager.update_tasks().await, 1);
    assert_eq!(manager.get_task(tracked.id).await.unwrap().state, State::Failed);
}

#[tokio::test]
async fn failed_task_is_restarted_on_its_worker() {
    let (first, a) = StubWorker::start().await;
    let (second, b) = StubWorker::start().await;
    let manager = manager(vec![a, b]);
    let task = dispatched(&manager, submission("web")).await;

    let mut failed = task.clone();
    failed.state = State::Failed;
    first.report(vec![failed]);
    manager.update_tasks().await;

    assert_eq!(manager.do_health_checks().await, 1);

    let events = first.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].task.id, task.id);
    assert_eq!(events[1].task.restart_count, 1);
    assert_eq!(events[1].task.state, State::Scheduled);
    assert!(second.events().is_empty());

    let local = manager.get_task(task.id).await.unwrap();
    assert_eq!(local.restart_count, 1);
    assert_eq!(local.state, State::Scheduled);
}

#[tokio::test]
async fn exhausted_task_is_never_restarted() {
    let (stub, address) = StubWorker::start().await;
    let manager = manager(vec![address]);
    let mut event = submission("web");
    event.task.restart_count = 3;
    event.task.health_check = Some("/health".to_string());
    let task = dispatched(&manager, event).await;

    let mut failed = task.clone();
    failed.state = State::Failed;
    stub.report(vec![failed]);
    manager.update_tasks().await;
    assert_eq!(manager.do_health_checks().await, 0);

    stub.health_status.store(503, Ordering::SeqCst);
    let mut running = task.clone();
    running.state = State::Running;
    stub.report(vec![running]);
    manager.update_tasks().await;
    assert_eq!(manager.do_health_checks().await, 0);

    assert_eq!(stub.events().len(), 1);
    assert_eq!(manager.get_task(task.id).await.unwrap().restart_count, 3);
    assert!(matches!(
        manager.restart_task(task.id).await,
        Err(ManagerError::RestartLimit(id)) if id == task.id
    ));
}

#[tokio::test]
async fn unhealthy_running_task_is_restarted() {
    let (stub, address) = StubWorker::start().await;
    let manager = manager(vec![address.clone()]);
    let mut event = submission("web");
    event.task.health_check = Some("/health".to_string());
    let task = dispatched(&manager, event).await;

    // The stub doubles as the task's published port.
    let mut running = task.clone();
    running.state = State::Running;
    running
        .host_ports
        .insert("80/tcp".to_string(), StubWorker::port(&address));
    stub.report(vec![running]);
    manager.update_tasks().await;

    assert_eq!(manager.do_health_checks().await, 0);
    assert_eq!(stub.events().len(), 1);

    stub.health_status.store(500, Ordering::SeqCst);
    assert_eq!(manager.do_health_checks().await, 1);
    let events = stub.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].task.restart_count, 1);
}

#[tokio::test]
async fn unreachable_health_endpoint_restarts_task() {
    let (stub, address) = StubWorker::start().await;
    let manager = manager(vec![address]);
    let mut event = submission("web");
    event.task.health_check = Some("/health".to_string());
    let task = dispatched(&manager, event).await;

    let closed = dead_address().await;
    let mut running = task.clone();
    running.state = State::Running;
    running
        .host_ports
        .insert("80/tcp".to_string(), StubWorker::port(&closed));
    stub.report(vec![running]);
    manager.update_tasks().await;

    assert_eq!(manager.do_health_checks().await, 1);
    let events = stub.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].task.id, task.id);
    assert_eq!(events[1].task.restart_count, 1);
    assert_eq!(manager.get_task(task.id).await.unwrap().restart_count, 1);
}

#[tokio::test]
async fn restart_to_unreachable_worker_parks_task() {
    let address = dead_address().await;
    let manager = manager(vec![address.clone()]);
    let event = submission("web");
    let task_id = event.task.id;
    manager.add_task(QueueItem::Event(event)).await;
    assert!(manager.send_work().await.unwrap_err().is_transport());

    let err = manager.restart_task(task_id).await.unwrap_err();

    assert!(err.is_transport());
    let pending = manager.pending_items().await;
    assert_eq!(pending.len(), 2);
    match &pending[1] {
        QueueItem::Task(task) => {
            assert_eq!(task.id, task_id);
            assert_eq!(task.restart_count, 1);
            assert_eq!(task.state, State::Scheduled);
        }
        other => panic!("expected a parked task, got {:?}", other),
    }
    assert_eq!(manager.worker_for(task_id).await.as_deref(), Some(address.as_str()));
}

#[tokio::test]
async fn restart_requires_an_assignment() {
    let (_stub, address) = StubWorker::start().await;
    let manager = manager(vec![address]);

    assert!(matches!(
        manager.restart_task(uuid::Uuid::new_v4()).await,
        Err(ManagerError::NotAssigned(_))
    ));
}
