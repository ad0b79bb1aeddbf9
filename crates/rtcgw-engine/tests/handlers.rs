//! Task handlers driven through the worker pool and in-memory queue.

mod support;

use std::sync::Arc;

use rtcgw_engine::{
    ClientRegistration, ClientTaskHandler, RegistrationReconciler, ResultReconciler,
    ResultsTaskHandler, client_task,
};
use rtcgw_ledger::{InMemoryLedger, SyncLedger};
use rtcgw_queue::{
    InMemoryTaskQueue, Outcome, Task, TaskError, TaskHandler, TaskKind, TaskQueue, TaskRouter,
    TaskStatus, WorkerConfig, WorkerPool,
};
use support::{FakeRegistry, ORG_UNIT, context};
use tokio_test::assert_ok;

fn registration() -> ClientRegistration {
    ClientRegistration {
        echis_patient_id: "E100".into(),
        patient_name: "Jane Doe".into(),
        facility_dhis2_id: ORG_UNIT.into(),
        ..Default::default()
    }
}

fn pool(
    registry: Arc<FakeRegistry>,
    ledger: Arc<InMemoryLedger>,
    queue: Arc<InMemoryTaskQueue>,
) -> WorkerPool {
    let ctx = context(registry, ledger);
    let router = TaskRouter::new()
        .with_handler(
            TaskKind::CreateClient,
            Arc::new(ClientTaskHandler::new(Arc::new(RegistrationReconciler::new(
                ctx.clone(),
            )))),
        )
        .with_handler(
            TaskKind::SendResults,
            Arc::new(ResultsTaskHandler::new(Arc::new(ResultReconciler::new(ctx)))),
        );
    let config = WorkerConfig {
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..Default::default()
    };
    WorkerPool::new(queue, Arc::new(router), config)
}

async fn drain(queue: &InMemoryTaskQueue, pool: &WorkerPool) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    loop {
        let claimed = assert_ok!(queue.claim(10).await);
        if claimed.is_empty() {
            return outcomes;
        }
        for task in claimed {
            outcomes.push(assert_ok!(pool.process_one(task).await));
        }
    }
}

#[tokio::test]
async fn test_malformed_payload_is_not_retried() {
    let registry = FakeRegistry::new();
    let ledger = Arc::new(InMemoryLedger::new());
    let handler = ClientTaskHandler::new(Arc::new(RegistrationReconciler::new(context(
        registry.clone(),
        ledger,
    ))));

    let task = Task::new(TaskKind::CreateClient, "{\"echis_patient_id\": 12", 3);
    let err = handler.handle(&task).await.expect_err("malformed");
    assert!(matches!(err, TaskError::SkipRetry(_)));
    assert_eq!(registry.create_count(), 0);
}

#[tokio::test]
async fn test_malformed_payload_is_archived_on_first_attempt() {
    let registry = FakeRegistry::new();
    let ledger = Arc::new(InMemoryLedger::new());
    let queue = Arc::new(InMemoryTaskQueue::default());
    let pool = pool(registry, ledger, queue.clone());

    let task = Task::new(TaskKind::SendResults, "not json", 25);
    assert_ok!(queue.enqueue(&task).await);

    let outcomes = drain(&queue, &pool).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], Outcome::Archived { .. }));

    let stored = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 1);
    assert_eq!(stored.status, TaskStatus::Archived);
}

#[tokio::test]
async fn test_unavailable_registry_exhausts_create_attempts() {
    let registry = FakeRegistry::new();
    registry.respond_to_create_raw(503, "Service Unavailable");
    let ledger = Arc::new(InMemoryLedger::new());
    let queue = Arc::new(InMemoryTaskQueue::default());
    let pool = pool(registry.clone(), ledger.clone(), queue.clone());

    let task = assert_ok!(client_task(&registration()));
    assert_ok!(queue.enqueue(&task).await);

    let outcomes = drain(&queue, &pool).await;
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], Outcome::RetryScheduled { .. }));
    assert!(matches!(outcomes[1], Outcome::RetryScheduled { .. }));
    assert!(matches!(outcomes[2], Outcome::Archived { .. }));

    assert_eq!(registry.create_count(), 3);
    assert!(ledger.is_empty());

    let stored = queue.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Archived);
    assert!(stored.last_error.unwrap().contains("HTTP 503"));
}

#[tokio::test]
async fn test_registration_task_completes_and_writes_ledger() {
    let registry = FakeRegistry::new();
    let ledger = Arc::new(InMemoryLedger::new());
    let queue = Arc::new(InMemoryTaskQueue::default());
    let pool = pool(registry.clone(), ledger.clone(), queue.clone());

    // The same registration delivered twice.
    for _ in 0..2 {
        let task = assert_ok!(client_task(&registration()));
        assert_ok!(queue.enqueue(&task).await);
    }

    let outcomes = drain(&queue, &pool).await;
    assert_eq!(outcomes, vec![Outcome::Completed, Outcome::Completed]);
    assert_eq!(registry.create_count(), 1);
    assert!(ledger.find("E100").await.unwrap().is_some());
}
