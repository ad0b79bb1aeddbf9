//! Tracing setup for the service binary.
//!
//! `logging.level` applies to the rtcgw crates and to request tracing.
//! Everything else (sqlx, hyper, reqwest) stays at `warn`. A `RUST_LOG`
//! filter replaces both and is never overridden by configuration.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Level used until configuration is loaded.
const STARTUP_LEVEL: &str = "info";

/// Targets that follow `logging.level`.
const SERVICE_TARGETS: &[&str] = &[
    "rtcgw_server",
    "rtcgw_engine",
    "rtcgw_queue",
    "rtcgw_ledger",
    "rtcgw_tracker",
    "tower_http",
];

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Filter directives for a configured level.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level == "off" {
        return level;
    }
    std::iter::once("warn".to_string())
        .chain(SERVICE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

fn service_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directives(level))
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(STARTUP_LEVEL)))
}

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init_tracing() {
    let filter = if rust_log_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| service_filter(STARTUP_LEVEL))
    } else {
        service_filter(STARTUP_LEVEL)
    };

    let (filter, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Applies `logging.level` once configuration is loaded. No-op before
/// [`init_tracing`] or when `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if rust_log_set() {
        return;
    }
    if let Some(handle) = FILTER_HANDLE.get() {
        let _ = handle.modify(|f| *f = service_filter(level));
    }
}
