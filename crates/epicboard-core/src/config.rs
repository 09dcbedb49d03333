//! Application configuration management.
//!
//! Two kinds of configuration live here:
//! - `ApiConfig`: the backend base URL and API key, supplied through the
//!   environment at deploy time.
//! - `Config`: user preferences persisted at
//!   `~/.config/epicboard/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "epicboard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "EPICBOARD_API_URL";
pub const ENV_API_KEY: &str = "EPICBOARD_API_KEY";
pub const ENV_PRODUCTION: &str = "EPICBOARD_PRODUCTION";

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub api_key: String,
    /// Production builds always mark credentials secure-only.
    pub production: bool,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            production: !cfg!(debug_assertions),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Read `EPICBOARD_API_URL`, `EPICBOARD_API_KEY` and the optional
    /// `EPICBOARD_PRODUCTION` flag.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_API_URL)
            .with_context(|| format!("{} is not set", ENV_API_URL))?;
        let key = std::env::var(ENV_API_KEY)
            .with_context(|| format!("{} is not set", ENV_API_KEY))?;
        let mut config = Self::new(&url, key)?;
        if let Ok(flag) = std::env::var(ENV_PRODUCTION) {
            config.production = parse_flag(&flag);
        }
        Ok(config)
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Whether stored credentials get the secure-transport-only flag.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.scheme() == "https" || self.production
    }

    /// Join a path such as `/rest/v1/projects?id=eq.1` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub last_email: Option<String>,
    #[serde(default)]
    pub credential_backend: CredentialBackend,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        let config = ApiConfig::new("https://demo.supabase.co/", "key").unwrap();
        assert_eq!(
            config.endpoint("/rest/v1/projects"),
            "https://demo.supabase.co/rest/v1/projects"
        );
        assert_eq!(
            config.endpoint("auth/v1/token?grant_type=refresh_token"),
            "https://demo.supabase.co/auth/v1/token?grant_type=refresh_token"
        );
    }

    #[test]
    fn test_secure_cookies_policy() {
        let https = ApiConfig::new("https://demo.supabase.co", "key")
            .unwrap()
            .with_production(false);
        assert!(https.secure_cookies());

        let http = ApiConfig::new("http://127.0.0.1:54321", "key")
            .unwrap()
            .with_production(false);
        assert!(!http.secure_cookies());

        assert!(http.with_production(true).secure_cookies());
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiConfig::new("not a url", "key").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_config_defaults_to_file_backend() {
        let config: Config = serde_json::from_str(r#"{"last_email": "a@b.c"}"#).unwrap();
        assert_eq!(config.credential_backend, CredentialBackend::File);
        assert_eq!(config.last_email.as_deref(), Some("a@b.c"));
    }
}
