//! Ingest endpoints.
//!
//! Records are validated and enqueued; reconciliation happens later in the
//! worker pool, so a 200 only means "accepted for processing".

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rtcgw_engine::{ClientRegistration, LabResult, client_task, results_task};
use rtcgw_queue::{QueueError, Task, TaskQueue};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct IngestState {
    pub queue: Arc<dyn TaskQueue>,
    /// Delivery cap for `results:send` tasks.
    pub default_max_attempts: u32,
}

pub fn router(state: IngestState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/clients", post(create_client))
        .route("/api/v1/results", post(send_results))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(tower_http::timeout::TimeoutLayer::new(request_timeout)),
        )
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn create_client(
    State(state): State<IngestState>,
    body: Result<Json<ClientRegistration>, JsonRejection>,
) -> Response {
    let Json(registration) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    if let Err(errors) = registration.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({"errors": errors}))).into_response();
    }

    enqueue(&state, client_task(&registration), "client queued for saving to the registry").await
}

async fn send_results(
    State(state): State<IngestState>,
    body: Result<Json<LabResult>, JsonRejection>,
) -> Response {
    let Json(result) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };
    if let Err(errors) = result.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({"errors": errors}))).into_response();
    }

    enqueue(
        &state,
        results_task(&result, state.default_max_attempts),
        "results queued for saving to the registry",
    )
    .await
}

fn bad_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"errors": {"body": rejection.body_text()}})),
    )
        .into_response()
}

async fn enqueue(
    state: &IngestState,
    task: Result<Task, QueueError>,
    message: &'static str,
) -> Response {
    let result = match task {
        Ok(task) => state.queue.enqueue(&task).await.map(|()| task),
        Err(e) => Err(e),
    };
    match result {
        Ok(task) => {
            info!(task_id = %task.id, kind = %task.kind, "Enqueued task");
            Json(json!({"message": message, "task_id": task.id})).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to enqueue task");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "could not queue the request"})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use rtcgw_queue::{InMemoryTaskQueue, TaskKind};
    use tower::ServiceExt;

    fn app(queue: Arc<InMemoryTaskQueue>) -> Router {
        router(
            IngestState {
                queue,
                default_max_attempts: 25,
            },
            Duration::from_secs(5),
        )
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_valid_client_is_queued() {
        let queue = Arc::new(InMemoryTaskQueue::default());
        let (status, body) = post_json(
            app(queue.clone()),
            "/api/v1/clients",
            json!({
                "echis_patient_id": "E100",
                "patient_name": "Jane Doe",
                "facility_dhis2_id": "OU000000001"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "client queued for saving to the registry");

        let tasks = queue.tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::CreateClient);
        assert_eq!(tasks[0].max_attempts, 3);
    }

    #[tokio::test]
    async fn test_invalid_client_reports_field_errors() {
        let queue = Arc::new(InMemoryTaskQueue::default());
        let (status, body) = post_json(
            app(queue.clone()),
            "/api/v1/clients",
            json!({"patient_name": "Jane Doe", "facility_dhis2_id": "bad", "cough": "yes"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["echis_patient_id"].is_string());
        assert!(body["errors"]["facility_dhis2_id"].is_string());
        assert!(body["errors"]["cough"].is_string());
        assert!(queue.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_results_use_worker_default_attempts() {
        let queue = Arc::new(InMemoryTaskQueue::default());
        let (status, _) = post_json(
            app(queue.clone()),
            "/api/v1/results",
            json!({
                "patient_id": "E100",
                "mtb": "DETECTED HIGH",
                "rr": "NOT DETECTED",
                "result_date": "2025-03-14 09:30:00"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let tasks = queue.tasks().await;
        assert_eq!(tasks[0].kind, TaskKind::SendResults);
        assert_eq!(tasks[0].max_attempts, 25);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let queue = Arc::new(InMemoryTaskQueue::default());
        let request = Request::post("/api/v1/results")
            .header("content-type", "application/json")
            .body(Body::from("{\"patient_id\": "))
            .unwrap();
        let response = app(queue).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
