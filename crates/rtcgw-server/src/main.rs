use std::env;
use std::path::PathBuf;

use rtcgw_server::App;
use rtcgw_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From RTCGW_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (rtcgw.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (RTCGW_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    rtcgw_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path.display(),
        source = %source,
        "Configuration loaded"
    );
    rtcgw_server::observability::apply_logging_level(&cfg.logging.level);

    let app = match App::build(&cfg).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = app.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

/// Priority order: `--config <path>`, then `RTCGW_CONFIG`, then `rtcgw.toml`.
fn resolve_config_path() -> (PathBuf, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (PathBuf::from(path), ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("RTCGW_CONFIG") {
        if !path.is_empty() {
            return (PathBuf::from(path), ConfigSource::EnvironmentVariable);
        }
    }

    (PathBuf::from(DEFAULT_CONFIG_FILE), ConfigSource::Default)
}
