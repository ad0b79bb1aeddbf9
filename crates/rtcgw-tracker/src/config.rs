//! Registry connection settings.

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// How requests authenticate against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMethod {
    #[default]
    Basic,
    /// Personal access token sent as `Authorization: Token <pat>`.
    Token,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Instance URL, e.g. `https://hmis.example.org/api/` or `https://hmis.example.org`.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub auth_method: AuthMethod,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Personal access token, used when `auth_method = "Token"`.
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_method: AuthMethod::default(),
            username: String::new(),
            password: String::new(),
            token: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.base_url.trim().is_empty() {
            return Err(TrackerError::invalid_config("registry.base_url must be set"));
        }
        match self.auth_method {
            AuthMethod::Basic if self.username.is_empty() => Err(TrackerError::invalid_config(
                "registry.username is required for Basic auth",
            )),
            AuthMethod::Token if self.token.is_empty() => Err(TrackerError::invalid_config(
                "registry.token is required for Token auth",
            )),
            _ => Ok(()),
        }
    }
}

/// Derives the `/api` root from a configured instance URL.
///
/// Anything after the first `/api/` segment is dropped; a URL without an
/// `/api` segment gets one appended.
pub fn api_root(url: &str) -> String {
    let url = url.trim();
    let trimmed = url.trim_end_matches('/');
    if let Some(pos) = url.find("/api/") {
        return format!("{}/api", &url[..pos]);
    }
    if trimmed.ends_with("/api") {
        return trimmed.to_string();
    }
    format!("{trimmed}/api")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_root() {
        assert_eq!(
            api_root("https://hmis.example.org/api/40/"),
            "https://hmis.example.org/api"
        );
        assert_eq!(
            api_root("https://hmis.example.org/api/"),
            "https://hmis.example.org/api"
        );
        assert_eq!(
            api_root("https://hmis.example.org/api"),
            "https://hmis.example.org/api"
        );
        assert_eq!(
            api_root("https://hmis.example.org/"),
            "https://hmis.example.org/api"
        );
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut cfg = RegistryConfig {
            base_url: "https://hmis.example.org/api/".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg.username = "admin".into();
        assert!(cfg.validate().is_ok());

        cfg.auth_method = AuthMethod::Token;
        assert!(cfg.validate().is_err());
        cfg.token = "d2pat_abc".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_auth_method_deserialize() {
        let cfg: RegistryConfig =
            serde_json::from_str(r#"{"base_url": "http://x/api", "auth_method": "Token"}"#)
                .expect("deserialize");
        assert_eq!(cfg.auth_method, AuthMethod::Token);
        assert_eq!(cfg.timeout_ms, 30_000);
    }
}
