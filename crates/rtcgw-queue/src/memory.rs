//! In-memory task queue.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::TaskQueue;
use crate::types::{Task, TaskStatus};

/// Queue held in process memory. Claims are serialized by a single lock.
pub struct InMemoryTaskQueue {
    tasks: Mutex<HashMap<Uuid, Task>>,
    visibility_timeout: chrono::Duration,
}

impl InMemoryTaskQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            visibility_timeout: chrono::Duration::from_std(visibility_timeout)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Snapshot of every task, oldest first.
    pub async fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.lock().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    fn is_stale(&self, task: &Task, now: DateTime<Utc>) -> bool {
        task.status == TaskStatus::Active
            && task
                .claimed_at
                .and_then(|at| at.checked_add_signed(self.visibility_timeout))
                .is_some_and(|deadline| deadline <= now)
    }

    fn is_claimable(&self, task: &Task, now: DateTime<Utc>) -> bool {
        match task.status {
            TaskStatus::Pending => task.next_attempt_at <= now,
            TaskStatus::Active => self.is_stale(task, now) && !task.attempts_exhausted(),
            TaskStatus::Completed | TaskStatus::Archived => false,
        }
    }

    async fn modify(&self, id: Uuid, apply: impl FnOnce(&mut Task)) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        apply(task);
        Ok(())
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(1800))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn claim(&self, limit: u32) -> Result<Vec<Task>, QueueError> {
        let now = Utc::now();
        let mut tasks = self.tasks.lock().await;

        for task in tasks.values_mut() {
            if self.is_stale(task, now) && task.attempts_exhausted() {
                warn!(task_id = %task.id, kind = %task.kind, attempts = task.attempts, "Archiving stale task");
                task.status = TaskStatus::Archived;
                task.last_error = Some(task.abandoned_reason());
            }
        }

        let mut due: Vec<&mut Task> = tasks
            .values_mut()
            .filter(|t| self.is_claimable(t, now))
            .collect();
        due.sort_by_key(|t| t.next_attempt_at);

        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|task| {
                task.status = TaskStatus::Active;
                task.attempts += 1;
                task.claimed_at = Some(now);
                task.clone()
            })
            .collect())
    }

    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        self.modify(id, |t| {
            t.status = TaskStatus::Completed;
            t.last_error = None;
        })
        .await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        self.modify(id, |t| {
            t.status = TaskStatus::Pending;
            t.next_attempt_at = next_attempt_at;
            t.claimed_at = None;
            t.last_error = Some(error.to_string());
        })
        .await
    }

    async fn archive(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        self.modify(id, |t| {
            t.status = TaskStatus::Archived;
            t.last_error = Some(error.to_string());
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, QueueError> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }
}
