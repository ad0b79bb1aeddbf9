//! PostgreSQL task queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::TaskQueue;
use crate::types::{Task, TaskKind, TaskStatus};

const TASK_COLUMNS: &str = "id, kind, payload, attempts, max_attempts, status, last_error, \
     created_at, next_attempt_at, claimed_at";

type TaskRow = (
    Uuid,
    String,
    String,
    i32,
    i32,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// Queue backed by the `_tasks` table, claimed with `FOR UPDATE SKIP LOCKED`
/// so any number of workers and processes can share it.
#[derive(Clone)]
pub struct PostgresTaskQueue {
    pool: PgPool,
    visibility_timeout: Duration,
    tables_created: Arc<DashSet<&'static str>>,
}

impl PostgresTaskQueue {
    pub fn new(pool: PgPool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
            tables_created: Arc::new(DashSet::new()),
        }
    }

    #[instrument(skip(self))]
    async fn ensure_tables(&self) -> Result<(), QueueError> {
        if self.tables_created.contains("tasks") {
            return Ok(());
        }

        sqlx_core::query::query(
            r#"
            CREATE TABLE IF NOT EXISTS _tasks (
                id UUID PRIMARY KEY,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                next_attempt_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                claimed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx_core::query::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_due ON _tasks (status, next_attempt_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Created task queue table");
        self.tables_created.insert("tasks");
        Ok(())
    }

    fn row_to_task(row: TaskRow) -> Result<Task, QueueError> {
        let (
            id,
            kind,
            payload,
            attempts,
            max_attempts,
            status,
            last_error,
            created_at,
            next_attempt_at,
            claimed_at,
        ) = row;
        Ok(Task {
            id,
            kind: TaskKind::parse(&kind).ok_or(QueueError::UnknownKind(kind))?,
            payload,
            attempts: attempts.max(0) as u32,
            max_attempts: max_attempts.max(0) as u32,
            status: TaskStatus::parse(&status),
            last_error,
            created_at,
            next_attempt_at,
            claimed_at,
        })
    }

    /// Decodes claimed rows, setting aside the ones that cannot be decoded
    /// with the reason they failed.
    fn split_claimed(rows: Vec<TaskRow>) -> (Vec<Task>, Vec<(Uuid, String)>) {
        let mut tasks = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        for row in rows {
            let id = row.0;
            match Self::row_to_task(row) {
                Ok(task) => tasks.push(task),
                Err(e) => rejected.push((id, e.to_string())),
            }
        }
        (tasks, rejected)
    }

    /// Archives active rows whose claim went stale on their last delivery.
    async fn archive_abandoned(&self) -> Result<u64, QueueError> {
        let result = sqlx_core::query::query(
            r#"
            UPDATE _tasks
            SET status = 'archived',
                last_error = 'no outcome reported after ' || attempts || ' deliveries'
            WHERE status = 'active'
              AND attempts >= max_attempts
              AND claimed_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(self.visibility_timeout.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        self.ensure_tables().await?;

        let result =
            sqlx_core::query::query("UPDATE _tasks SET status = $2, last_error = $3 WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .bind(error)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        self.ensure_tables().await?;

        sqlx_core::query::query(
            r#"
            INSERT INTO _tasks (
                id, kind, payload, attempts, max_attempts, status, created_at, next_attempt_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(task.id)
        .bind(task.kind.as_str())
        .bind(&task.payload)
        .bind(task.attempts as i32)
        .bind(task.max_attempts as i32)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.next_attempt_at)
        .execute(&self.pool)
        .await?;

        debug!(task_id = %task.id, kind = %task.kind, "Enqueued task");
        Ok(())
    }

    async fn claim(&self, limit: u32) -> Result<Vec<Task>, QueueError> {
        self.ensure_tables().await?;

        let abandoned = self.archive_abandoned().await?;
        if abandoned > 0 {
            warn!(count = abandoned, "Archived stale tasks with no deliveries left");
        }

        let sql = format!(
            r#"
            UPDATE _tasks
            SET status = 'active', attempts = attempts + 1, claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM _tasks
                WHERE (status = 'pending' AND next_attempt_at <= NOW())
                   OR (status = 'active'
                       AND attempts < max_attempts
                       AND claimed_at < NOW() - make_interval(secs => $2))
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {TASK_COLUMNS}
            "#
        );
        let rows: Vec<TaskRow> = sqlx_core::query_as::query_as(&sql)
            .bind(i64::from(limit))
            .bind(self.visibility_timeout.as_secs_f64())
            .fetch_all(&self.pool)
            .await?;

        let (tasks, rejected) = Self::split_claimed(rows);
        for (id, reason) in rejected {
            warn!(task_id = %id, error = %reason, "Archiving undecodable task");
            self.set_status(id, TaskStatus::Archived, Some(&reason)).await?;
        }
        Ok(tasks)
    }

    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        self.set_status(id, TaskStatus::Completed, None).await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        self.ensure_tables().await?;

        let result = sqlx_core::query::query(
            r#"
            UPDATE _tasks
            SET status = 'pending', next_attempt_at = $2, last_error = $3, claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn archive(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        self.set_status(id, TaskStatus::Archived, Some(error)).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, QueueError> {
        self.ensure_tables().await?;

        let sql = format!("SELECT {TASK_COLUMNS} FROM _tasks WHERE id = $1");
        let row: Option<TaskRow> = sqlx_core::query_as::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_task).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str) -> TaskRow {
        let now = Utc::now();
        (
            Uuid::new_v4(),
            kind.to_string(),
            "{}".to_string(),
            1,
            3,
            "active".to_string(),
            None,
            now,
            now,
            Some(now),
        )
    }

    #[test]
    fn test_unknown_kind_does_not_fail_the_batch() {
        let good = row("client:create");
        let bad = row("email:send");
        let bad_id = bad.0;
        let also_good = row("results:send");

        let (tasks, rejected) = PostgresTaskQueue::split_claimed(vec![good, bad, also_good]);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].kind, TaskKind::CreateClient);
        assert_eq!(tasks[1].kind, TaskKind::SendResults);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, bad_id);
        assert!(rejected[0].1.contains("email:send"));
    }
}
