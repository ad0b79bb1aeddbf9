use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::types::{Task, TaskKind};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}

/// Maps task kinds to their handlers.
#[derive(Clone, Default)]
pub struct TaskRouter {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handler(mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handler(&self, kind: TaskKind) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = TaskKind> + '_ {
        self.handlers.keys().copied()
    }
}
