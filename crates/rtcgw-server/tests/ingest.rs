//! The assembled service accepts records and queues them for the workers.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use rtcgw_ledger::InMemoryLedger;
use rtcgw_queue::{InMemoryTaskQueue, TaskKind, TaskStatus};
use rtcgw_server::{App, AppConfig};
use rtcgw_tracker::{HttpRegistryClient, RegistryConfig};
use tower::ServiceExt;

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.registry = RegistryConfig {
        base_url: "http://127.0.0.1:9/api".into(),
        username: "admin".into(),
        password: "district".into(),
        ..Default::default()
    };
    cfg.programs.tracker_program = "PRG00000001".into();
    cfg.programs.tracker_program_stage = "STG00000001".into();
    cfg.programs.tracked_entity_type = "TYPE0000001".into();
    cfg
}

fn app(queue: Arc<InMemoryTaskQueue>) -> App {
    app_with(config(), queue)
}

fn app_with(cfg: AppConfig, queue: Arc<InMemoryTaskQueue>) -> App {
    let registry = HttpRegistryClient::new(&cfg.registry).expect("client");
    App::assemble(&cfg, queue, Arc::new(InMemoryLedger::new()), Arc::new(registry))
}

#[tokio::test]
async fn health_is_ok() {
    let response = app(Arc::new(InMemoryTaskQueue::default()))
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn accepted_registration_is_pending_in_queue() {
    let queue = Arc::new(InMemoryTaskQueue::default());
    let request = Request::post("/api/v1/clients")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"echis_patient_id":"E100","patient_name":"Jane Doe","facility_dhis2_id":"OU000000001"}"#,
        ))
        .unwrap();

    let response = app(queue.clone()).router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert!(body["message"].as_str().unwrap().contains("queued"));

    let tasks = queue.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, TaskKind::CreateClient);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(body["task_id"], tasks[0].id.to_string());
}

#[tokio::test]
async fn run_fails_when_address_is_taken() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config();
    cfg.server.host = "127.0.0.1".into();
    cfg.server.port = taken.local_addr().unwrap().port();

    let queue = Arc::new(InMemoryTaskQueue::default());
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        app_with(cfg, queue).run(),
    )
    .await
    .expect("run returns instead of serving");
    assert!(result.is_err());
}
