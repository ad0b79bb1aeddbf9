//! PostgreSQL ledger backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::SyncLedger;
use crate::pool::create_pool;
use crate::types::{DailyActivity, NewSyncLog, SyncLog, fill_days, window_start};

const SYNC_LOG_COLUMNS: &str = "id, echis_id, tracked_entity, event_id, org_unit, event_date, \
     client_creation_errors, results_updated, results_update_errors, lab_enrollment, lab_event, \
     created, updated";

type SyncLogRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<DateTime<Utc>>,
    String,
    bool,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn row_to_sync_log(row: SyncLogRow) -> SyncLog {
    let (
        id,
        echis_id,
        tracked_entity,
        event_id,
        org_unit,
        event_date,
        client_creation_errors,
        results_updated,
        results_update_errors,
        lab_enrollment,
        lab_event,
        created,
        updated,
    ) = row;
    SyncLog {
        id,
        echis_id,
        tracked_entity,
        event_id,
        org_unit,
        event_date,
        client_creation_errors,
        results_updated,
        results_update_errors,
        lab_enrollment,
        lab_event,
        created,
        updated,
    }
}

#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool and, if configured, applies migrations.
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            crate::migrations::run(&pool).await?;
        }
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn set_text(&self, column: &'static str, echis_id: &str, value: &str) -> Result<()> {
        let sql = format!("UPDATE sync_log SET {column} = $2, updated = NOW() WHERE echis_id = $1");
        let result = sqlx_core::query::query(&sql)
            .bind(echis_id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(echis_id));
        }
        debug!(echis_id, column, "Updated sync log");
        Ok(())
    }
}

#[async_trait]
impl SyncLedger for PostgresLedger {
    #[instrument(skip(self))]
    async fn find(&self, echis_id: &str) -> Result<Option<SyncLog>> {
        let sql = format!("SELECT {SYNC_LOG_COLUMNS} FROM sync_log WHERE echis_id = $1");
        let row: Option<SyncLogRow> = sqlx_core::query_as::query_as(&sql)
            .bind(echis_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_sync_log))
    }

    #[instrument(skip(self, new), fields(echis_id = %new.echis_id))]
    async fn insert(&self, new: NewSyncLog) -> Result<SyncLog> {
        let sql = format!(
            "INSERT INTO sync_log \
             (echis_id, tracked_entity, event_id, org_unit, event_date, client_creation_errors) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SYNC_LOG_COLUMNS}"
        );
        let row: SyncLogRow = sqlx_core::query_as::query_as(&sql)
            .bind(&new.echis_id)
            .bind(&new.tracked_entity)
            .bind(&new.event_id)
            .bind(&new.org_unit)
            .bind(new.event_date)
            .bind(&new.client_creation_errors)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LedgerError::from_insert(e, &new.echis_id))?;

        debug!(id = row.0, "Inserted sync log");
        Ok(row_to_sync_log(row))
    }

    async fn set_client_creation_errors(&self, echis_id: &str, errors: &str) -> Result<()> {
        self.set_text("client_creation_errors", echis_id, errors)
            .await
    }

    async fn set_results_updated(&self, echis_id: &str) -> Result<()> {
        let result = sqlx_core::query::query(
            "UPDATE sync_log SET results_updated = TRUE, updated = NOW() WHERE echis_id = $1",
        )
        .bind(echis_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(echis_id));
        }
        debug!(echis_id, "Marked results updated");
        Ok(())
    }

    async fn set_results_update_errors(&self, echis_id: &str, errors: &str) -> Result<()> {
        self.set_text("results_update_errors", echis_id, errors)
            .await
    }

    async fn set_lab_enrollment(&self, echis_id: &str, enrollment: &str) -> Result<()> {
        self.set_text("lab_enrollment", echis_id, enrollment).await
    }

    async fn set_lab_event(&self, echis_id: &str, event: &str) -> Result<()> {
        self.set_text("lab_event", echis_id, event).await
    }

    #[instrument(skip(self))]
    async fn daily_activity(&self, days: u32) -> Result<Vec<DailyActivity>> {
        let today = Utc::now().date_naive();
        let since = window_start(today, days).and_time(NaiveTime::MIN).and_utc();

        let rows: Vec<(NaiveDate, i64, i64)> = sqlx_core::query_as::query_as(
            r#"
            SELECT (created AT TIME ZONE 'UTC')::date AS day,
                   COUNT(DISTINCT echis_id),
                   COUNT(DISTINCT echis_id) FILTER (WHERE results_updated)
            FROM sync_log
            WHERE created >= $1
            GROUP BY day
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let counts: HashMap<NaiveDate, (i64, i64)> = rows
            .into_iter()
            .map(|(day, created, updated)| (day, (created, updated)))
            .collect();
        Ok(fill_days(today, days, &counts))
    }
}
