use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Work item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Register a client in the registry.
    #[serde(rename = "client:create")]
    CreateClient,
    /// Push a lab result for a registered client.
    #[serde(rename = "results:send")]
    SendResults,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateClient => "client:create",
            Self::SendResults => "results:send",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client:create" => Some(Self::CreateClient),
            "results:send" => Some(Self::SendResults),
            _ => None,
        }
    }

    /// Delivery cap for this kind, `None` to use the worker default.
    pub fn default_max_attempts(self) -> Option<u32> {
        match self {
            Self::CreateClient => Some(3),
            Self::SendResults => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for `next_attempt_at`.
    Pending,
    /// Claimed by a worker.
    Active,
    Completed,
    /// Given up on: out of attempts or not retryable.
    Archived,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "completed" => Self::Completed,
            "archived" => Self::Archived,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    /// Serialized input record, decoded by the handler.
    pub payload: String,
    /// Deliveries so far, incremented on each claim.
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: TaskStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(kind: TaskKind, payload: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            payload: payload.into(),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            status: TaskStatus::Pending,
            last_error: None,
            created_at: now,
            next_attempt_at: now,
            claimed_at: None,
        }
    }

    /// Serializes `record` as the payload.
    pub fn from_record<T: Serialize>(
        kind: TaskKind,
        record: &T,
        max_attempts: u32,
    ) -> Result<Self, QueueError> {
        Ok(Self::new(kind, serde_json::to_string(record)?, max_attempts))
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Error recorded when a claimed task never reports an outcome and has
    /// no deliveries left.
    pub fn abandoned_reason(&self) -> String {
        format!("no outcome reported after {} deliveries", self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        for kind in [TaskKind::CreateClient, TaskKind::SendResults] {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskKind::parse("email:send"), None);
        assert_eq!(
            serde_json::to_string(&TaskKind::CreateClient).expect("serialize"),
            "\"client:create\""
        );
        assert_eq!(TaskKind::CreateClient.default_max_attempts(), Some(3));
        assert_eq!(TaskKind::SendResults.default_max_attempts(), None);
    }

    #[test]
    fn test_new_task_is_due_immediately() {
        let task = Task::new(TaskKind::SendResults, "{}", 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.max_attempts, 1);
        assert!(task.next_attempt_at <= Utc::now());
        assert!(!task.attempts_exhausted());
    }
}
