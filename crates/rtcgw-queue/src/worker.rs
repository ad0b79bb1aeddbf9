//! Worker pool: claims tasks, runs their handlers, and records the outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{QueueError, TaskError};
use crate::handler::TaskRouter;
use crate::queue::TaskQueue;
use crate::types::Task;

/// What happened to a task after one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    RetryScheduled { next_attempt_at: DateTime<Utc> },
    Archived { reason: String },
}

/// Delay before the next delivery after `attempts` failed ones:
/// `base * 2^(attempts - 1)`, capped at the configured maximum.
pub fn backoff_delay(config: &WorkerConfig, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(31);
    let delay = config
        .retry_base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.retry_max_delay_ms);
    Duration::from_millis(delay)
}

#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    router: Arc<TaskRouter>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, router: Arc<TaskRouter>, config: WorkerConfig) -> Self {
        Self {
            queue,
            router,
            config,
        }
    }

    /// Runs `concurrency` worker loops until `shutdown` turns true or its
    /// sender is dropped. In-flight tasks finish before this returns.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            concurrency = self.config.concurrency,
            kinds = ?self.router.kinds().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Starting worker pool"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.concurrency.max(1) {
            let pool = self.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { pool.worker_loop(worker_id, shutdown).await });
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Worker pool stopped");
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let claimed = match self.queue.claim(self.config.batch_size).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to claim tasks");
                    Vec::new()
                }
            };
            let full_batch = claimed.len() as u32 >= self.config.batch_size;

            for task in claimed {
                let task_id = task.id;
                if let Err(e) = self.process_one(task).await {
                    error!(worker_id, task_id = %task_id, error = %e, "Failed to record task outcome");
                }
            }

            if full_batch {
                continue;
            }

            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    match result {
                        Ok(()) if *shutdown.borrow() => break,
                        Ok(()) => {}
                        Err(_) => break,
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    /// Delivers one claimed task to its handler and records the outcome.
    pub async fn process_one(&self, task: Task) -> Result<Outcome, QueueError> {
        let Some(handler) = self.router.handler(task.kind) else {
            let reason = format!("no handler registered for {}", task.kind);
            warn!(task_id = %task.id, kind = %task.kind, "Archiving task without handler");
            self.queue.archive(task.id, &reason).await?;
            return Ok(Outcome::Archived { reason });
        };

        let result = match AssertUnwindSafe(handler.handle(&task)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task_id = %task.id, kind = %task.kind, panic = %message, "Task handler panicked");
                Err(TaskError::retry(format!("handler panicked: {message}")))
            }
        };

        match result {
            Ok(()) => {
                self.queue.complete(task.id).await?;
                debug!(task_id = %task.id, kind = %task.kind, attempts = task.attempts, "Task completed");
                Ok(Outcome::Completed)
            }
            Err(TaskError::SkipRetry(reason)) => {
                warn!(task_id = %task.id, kind = %task.kind, error = %reason, "Task failed, not retrying");
                self.queue.archive(task.id, &reason).await?;
                Ok(Outcome::Archived { reason })
            }
            Err(TaskError::Retry(reason)) if task.attempts_exhausted() => {
                warn!(
                    task_id = %task.id,
                    kind = %task.kind,
                    attempts = task.attempts,
                    error = %reason,
                    "Task failed permanently after {} attempts",
                    task.max_attempts
                );
                self.queue.archive(task.id, &reason).await?;
                Ok(Outcome::Archived { reason })
            }
            Err(TaskError::Retry(reason)) => {
                let delay = backoff_delay(&self.config, task.attempts);
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::hours(1));
                warn!(
                    task_id = %task.id,
                    kind = %task.kind,
                    attempts = task.attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Task failed, retry scheduled"
                );
                self.queue
                    .schedule_retry(task.id, next_attempt_at, &reason)
                    .await?;
                Ok(Outcome::RetryScheduled { next_attempt_at })
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
