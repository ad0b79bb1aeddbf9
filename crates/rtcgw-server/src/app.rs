//! Service assembly and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rtcgw_engine::{
    ClientTaskHandler, FieldMapper, PayloadBuilder, RegistrationReconciler, ResultReconciler,
    ResultsTaskHandler, SyncContext,
};
use rtcgw_ledger::{PostgresLedger, SyncLedger, mask_password};
use rtcgw_queue::{PostgresTaskQueue, TaskKind, TaskQueue, TaskRouter, WorkerPool};
use rtcgw_tracker::{HttpRegistryClient, RegistryClient};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::routes::{IngestState, router};

/// Days of ledger activity logged at start-up.
const ACTIVITY_WINDOW_DAYS: u32 = 7;

pub struct App {
    addr: SocketAddr,
    router: Router,
    workers: WorkerPool,
}

impl App {
    /// Connects to PostgreSQL (running migrations if configured) and the
    /// registry, then wires the reconcilers into the queue and routes.
    pub async fn build(config: &AppConfig) -> anyhow::Result<Self> {
        info!(url = %mask_password(&config.database.url), "Connecting to ledger database");
        let ledger = PostgresLedger::connect(&config.database).await?;
        log_activity(&ledger).await;

        let queue = PostgresTaskQueue::new(ledger.pool().clone(), config.workers.visibility_timeout());
        let registry = HttpRegistryClient::new(&config.registry)?;
        info!(api_root = registry.api_root(), "Registry client ready");

        Ok(Self::assemble(
            config,
            Arc::new(queue),
            Arc::new(ledger),
            Arc::new(registry),
        ))
    }

    /// Wires already-constructed backends.
    pub fn assemble(
        config: &AppConfig,
        queue: Arc<dyn TaskQueue>,
        ledger: Arc<dyn SyncLedger>,
        registry: Arc<dyn RegistryClient>,
    ) -> Self {
        let ctx = SyncContext::new(
            registry,
            ledger,
            FieldMapper::new(config.mapping.clone()),
            PayloadBuilder::new(config.programs.clone()),
        );
        if !config.programs.lab_enabled() {
            warn!("programs.lab_program is not set; positive results will fail the lab branch");
        }

        let tasks = TaskRouter::new()
            .with_handler(
                TaskKind::CreateClient,
                Arc::new(ClientTaskHandler::new(Arc::new(RegistrationReconciler::new(
                    ctx.clone(),
                )))),
            )
            .with_handler(
                TaskKind::SendResults,
                Arc::new(ResultsTaskHandler::new(Arc::new(ResultReconciler::new(ctx)))),
            );
        let workers = WorkerPool::new(queue.clone(), Arc::new(tasks), config.workers.clone());

        let router = router(
            IngestState {
                queue,
                default_max_attempts: config.workers.default_max_attempts,
            },
            Duration::from_millis(config.server.request_timeout_ms),
        );

        Self {
            addr: config.addr(),
            router,
            workers,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serves HTTP and runs the workers until Ctrl+C. Workers finish their
    /// in-flight tasks before this returns. Fails without starting the
    /// workers when the listen address cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("listening on {}", self.addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = tokio::spawn(self.workers.run(shutdown_rx));
        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = workers.await {
            warn!(error = %e, "Worker pool ended abnormally");
        }
        served?;
        Ok(())
    }
}

async fn log_activity(ledger: &dyn SyncLedger) {
    match ledger.daily_activity(ACTIVITY_WINDOW_DAYS).await {
        Ok(days) => {
            let created: i64 = days.iter().map(|d| d.created).sum();
            let results_updated: i64 = days.iter().map(|d| d.results_updated).sum();
            info!(days = ACTIVITY_WINDOW_DAYS, created, results_updated, "Ledger activity");
        }
        Err(e) => warn!(error = %e, "Could not read ledger activity"),
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
