use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./fiberwatch.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub monitors: Option<Vec<MonitoringConfig>>,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,
}

/// Binding to one ACS endpoint plus the polling policy for it.
///
/// One engine instance binds to exactly one config at a time; starting a
/// second monitor for the same config replaces the first.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MonitoringConfig {
    pub id: String,
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "util::get_default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl MonitoringConfig {
    /// Build a config from the `ACS_*` environment, for deployments without a
    /// config file.
    pub fn from_env(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: util::get_acs_url(),
            username: util::get_acs_username(),
            password: util::get_acs_password(),
            timeout_secs: util::DEFAULT_TIMEOUT_SECS,
            active: true,
            poll_interval_minutes: default_poll_interval(),
            last_sync: None,
        }
    }

    /// Operator mistakes fail fast here, before any timer or sync starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("monitoring config has an empty id");
        }

        if self.base_url.trim().is_empty() {
            anyhow::bail!("monitoring config '{}' has an empty ACS endpoint", self.id);
        }

        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            anyhow::anyhow!(
                "monitoring config '{}' has an invalid ACS endpoint '{}': {e}",
                self.id,
                self.base_url
            )
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "monitoring config '{}' has an unsupported ACS endpoint scheme '{}'",
                self.id,
                url.scheme()
            );
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("monitoring config '{}' has a zero request timeout", self.id);
        }

        if self.poll_interval_minutes == 0 {
            anyhow::bail!("monitoring config '{}' has a zero poll interval", self.id);
        }

        Ok(())
    }
}

fn default_active() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
