use std::net::SocketAddr;

use rtcgw_engine::{MappingTable, ProgramConfig};
use rtcgw_ledger::LedgerConfig;
use rtcgw_queue::WorkerConfig;
use rtcgw_tracker::RegistryConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: LedgerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub programs: ProgramConfig,
    /// External field name → registry ID tables
    #[serde(default)]
    pub mapping: MappingTable,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        self.database.validate().map_err(|e| e.to_string())?;
        self.registry.validate().map_err(|e| e.to_string())?;
        self.programs.validate()?;
        self.mapping.validate()?;
        self.workers.validate()?;

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let ip = self
            .server
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    9191
}
fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::Path;

    /// Default file name when neither `--config` nor `RTCGW_CONFIG` is given.
    pub const DEFAULT_CONFIG_FILE: &str = "rtcgw.toml";

    /// Reads the TOML file at `path` (or the default file) if it exists,
    /// overlays `RTCGW__SECTION__KEY` environment variables and validates.
    pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        // Environment variable overrides, e.g., RTCGW__REGISTRY__BASE_URL=https://hmis.example.org
        builder = builder.add_source(
            Environment::with_prefix("RTCGW")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcgw_tracker::AuthMethod;

    fn valid() -> AppConfig {
        AppConfig {
            registry: RegistryConfig {
                base_url: "https://hmis.example.org/api/".into(),
                username: "admin".into(),
                password: "district".into(),
                ..Default::default()
            },
            programs: ProgramConfig {
                tracker_program: "PRG00000001".into(),
                tracker_program_stage: "STG00000001".into(),
                tracked_entity_type: "TYPE0000001".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_minimal_config() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejections() {
        let mut cfg = valid();
        cfg.server.port = 0;
        assert!(cfg.validate().unwrap_err().contains("server.port"));

        let mut cfg = valid();
        cfg.registry.auth_method = AuthMethod::Token;
        assert!(cfg.validate().unwrap_err().contains("registry.token"));

        let mut cfg = valid();
        cfg.programs.tracker_program_stage.clear();
        assert!(cfg.validate().unwrap_err().contains("tracker_program_stage"));

        let mut cfg = valid();
        cfg.workers.concurrency = 0;
        assert!(cfg.validate().unwrap_err().contains("workers.concurrency"));

        let mut cfg = valid();
        cfg.mapping
            .data_elements
            .insert("cough".into(), "DE000000001".into());
        cfg.mapping
            .data_elements
            .insert("fever".into(), "DE000000001".into());
        assert!(cfg.validate().unwrap_err().contains("mapping.data_elements"));

        let mut cfg = valid();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn test_addr_falls_back_to_any() {
        let mut cfg = valid();
        cfg.server.host = "not-an-ip".into();
        cfg.server.port = 8088;
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:8088");
    }
}
