//! Sync ledger: the local record of which external client IDs have been
//! synced to the registry, and to which registry identifiers.
//!
//! A row's existence is the idempotency gate for registration. Identifiers
//! assigned at creation (`tracked_entity`, `event_id`) are never rewritten;
//! every other field changes through a named setter that commits on its own.
//!
//! Two backends implement [`SyncLedger`]:
//!
//! - [`PostgresLedger`] for deployments, with embedded migrations
//! - [`InMemoryLedger`] for tests and local runs

pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod types;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::SyncLedger;
pub use memory::InMemoryLedger;
pub use pool::{create_pool, mask_password};
pub use postgres::PostgresLedger;
pub use types::{DailyActivity, NewSyncLog, SyncLog};

// Re-export for callers that hold a pool.
pub use sqlx_postgres::PgPool;
