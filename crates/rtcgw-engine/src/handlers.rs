//! Queue handlers for the two task kinds.

use std::sync::Arc;

use async_trait::async_trait;
use rtcgw_queue::{QueueError, Task, TaskError, TaskHandler, TaskKind};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::records::{ClientRegistration, LabResult};
use crate::registration::RegistrationReconciler;
use crate::results::ResultReconciler;

/// Builds a `client:create` task.
pub fn client_task(registration: &ClientRegistration) -> Result<Task, QueueError> {
    let kind = TaskKind::CreateClient;
    Task::from_record(kind, registration, kind.default_max_attempts().unwrap_or(1))
}

/// Builds a `results:send` task. `default_max_attempts` applies when the kind sets no cap.
pub fn results_task(result: &LabResult, default_max_attempts: u32) -> Result<Task, QueueError> {
    let kind = TaskKind::SendResults;
    let max_attempts = kind.default_max_attempts().unwrap_or(default_max_attempts);
    Task::from_record(kind, result, max_attempts)
}

fn decode<T: DeserializeOwned>(task: &Task) -> Result<T, TaskError> {
    serde_json::from_str(&task.payload)
        .map_err(|e| TaskError::skip_retry(format!("{} payload does not decode: {e}", task.kind)))
}

pub struct ClientTaskHandler {
    reconciler: Arc<RegistrationReconciler>,
}

impl ClientTaskHandler {
    pub fn new(reconciler: Arc<RegistrationReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl TaskHandler for ClientTaskHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let registration: ClientRegistration = decode(task)?;
        let outcome = self.reconciler.reconcile(&registration).await?;
        debug!(task_id = %task.id, ?outcome, "Registration task done");
        Ok(())
    }
}

pub struct ResultsTaskHandler {
    reconciler: Arc<ResultReconciler>,
}

impl ResultsTaskHandler {
    pub fn new(reconciler: Arc<ResultReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl TaskHandler for ResultsTaskHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let result: LabResult = decode(task)?;
        let outcome = self.reconciler.reconcile(&result).await?;
        debug!(task_id = %task.id, ?outcome, "Results task done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_attempt_caps() {
        let task = client_task(&ClientRegistration::default()).unwrap();
        assert_eq!(task.kind, TaskKind::CreateClient);
        assert_eq!(task.max_attempts, 3);

        let task = results_task(&LabResult::default(), 25).unwrap();
        assert_eq!(task.kind, TaskKind::SendResults);
        assert_eq!(task.max_attempts, 25);
    }

    #[test]
    fn test_decode_failure_skips_retry() {
        let task = Task::new(TaskKind::CreateClient, "{not json", 3);
        let err = decode::<ClientRegistration>(&task).unwrap_err();
        assert!(!err.is_retryable());
    }
}
