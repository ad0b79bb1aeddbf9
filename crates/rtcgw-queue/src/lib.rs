//! Task queue for RTCGw.
//!
//! Inbound records are serialized into [`Task`]s, stored by a [`TaskQueue`]
//! backend and delivered at least once to the [`TaskHandler`] registered for
//! their [`TaskKind`]. A handler reports failures as [`TaskError::Retry`]
//! (transient, redelivered with backoff until `max_attempts`) or
//! [`TaskError::SkipRetry`] (archived immediately).

pub mod config;
pub mod error;
pub mod handler;
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod types;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{QueueError, TaskError};
pub use handler::{TaskHandler, TaskRouter};
pub use memory::InMemoryTaskQueue;
pub use postgres::PostgresTaskQueue;
pub use queue::TaskQueue;
pub use types::{Task, TaskKind, TaskStatus};
pub use worker::{Outcome, WorkerPool, backoff_delay};
