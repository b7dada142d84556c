//! Fetch settings
//!
//! Read from `<config dir>/forge-fetch/config.toml`:
//!
//! ```toml
//! cache-dir = "/var/cache/forge-fetch"
//! connect-timeout-secs = 10
//! timeout-secs = 300
//!
//! [access-tokens]
//! "github.com" = "ghp_..."
//! "gitlab.com" = "PAT:glpat-..."
//! ```
//!
//! `FORGE_FETCH_ACCESS_TOKENS` (whitespace-separated `host=token` pairs) is
//! applied on top of the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding extra access tokens
pub const ACCESS_TOKENS_ENV: &str = "FORGE_FETCH_ACCESS_TOKENS";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Malformed `host=token` entry
    #[error("Invalid access token entry '{0}', expected 'host=token'")]
    InvalidAccessToken(String),
}

/// Read-only settings shared by every fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchSettings {
    /// Hostname to token
    pub access_tokens: BTreeMap<String, String>,

    /// Root of the tree store and fact cache
    pub cache_dir: Option<PathBuf>,

    pub connect_timeout_secs: Option<u64>,

    /// Whole-request timeout; unlimited when unset
    pub timeout_secs: Option<u64>,
}

impl FetchSettings {
    /// Parse settings from TOML text
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Location of the user config file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("forge-fetch").join("config.toml"))
    }

    /// Defaults, then the user config file, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Ok(value) = std::env::var(ACCESS_TOKENS_ENV) {
            settings.access_tokens.extend(parse_access_tokens(&value)?);
        }

        Ok(settings)
    }

    pub fn access_token(&self, host: &str) -> Option<&str> {
        self.access_tokens.get(host).map(String::as_str)
    }

    pub fn with_access_token(mut self, host: impl Into<String>, token: impl Into<String>) -> Self {
        self.access_tokens.insert(host.into(), token.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Configured cache root, or the platform cache directory
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forge-fetch")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Parse whitespace-separated `host=token` pairs
pub fn parse_access_tokens(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    value
        .split_whitespace()
        .map(|entry| match entry.split_once('=') {
            Some((host, token)) if !host.is_empty() && !token.is_empty() => {
                Ok((host.to_string(), token.to_string()))
            }
            _ => Err(ConfigError::InvalidAccessToken(entry.to_string())),
        })
        .collect()
}
