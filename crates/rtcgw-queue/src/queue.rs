use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QueueError;
use crate::types::Task;

/// Storage trait for the task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Add a task to the queue
    async fn enqueue(&self, task: &Task) -> Result<(), QueueError>;

    /// Claim up to `limit` due tasks, marking them active and counting the
    /// delivery. Tasks left active past the visibility timeout are claimable
    /// again.
    async fn claim(&self, limit: u32) -> Result<Vec<Task>, QueueError>;

    async fn complete(&self, id: Uuid) -> Result<(), QueueError>;

    /// Return a task to pending, due at `next_attempt_at`.
    async fn schedule_retry(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError>;

    /// Stop delivering a task.
    async fn archive(&self, id: Uuid, error: &str) -> Result<(), QueueError>;

    async fn get(&self, id: Uuid) -> Result<Option<Task>, QueueError>;
}
