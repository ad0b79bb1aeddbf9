//! RTCGw service wiring.
//!
//! Loads [`AppConfig`], exposes the ingest endpoints that validate and
//! enqueue records, and runs the worker pool that drives the reconcilers.

pub mod app;
pub mod config;
pub mod observability;
pub mod routes;

pub use app::App;
pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing};
pub use routes::{IngestState, router};
