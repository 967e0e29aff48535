// src/config/feeds.rs
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::notify::PayloadTemplate;

pub const ENV_FEEDS_CONFIG_PATH: &str = "FEEDS_CONFIG_PATH";
pub const DEFAULT_FEEDS_CONFIG_PATH: &str = "config/feeds.toml";

fn default_timeout_secs() -> u64 {
    10
}
fn default_retries() -> u8 {
    3
}
fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    concat!("market-feed-notifier/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Top-level file. Targets and sources stay raw tables here and are converted one
/// entry at a time, so a malformed entry only rejects itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub targets: BTreeMap<String, toml::Table>,
    #[serde(default)]
    pub sources: Vec<toml::Table>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for upstream fetches and deliveries.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Delivery target entry. Secrets are referenced by env var name, never inlined.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    Discord {
        webhook_url_env: String,
        #[serde(default = "default_retries")]
        max_retries: u8,
    },
    Slack {
        webhook_url_env: String,
    },
    Email {
        smtp_host: String,
        username_env: String,
        password_env: String,
        from: String,
        to: String,
    },
    Log,
}

/// One `[[sources]]` entry. `kind` and `options` are checked per source at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: String,
    pub target: String,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub template: Option<PayloadTemplate>,
    #[serde(default)]
    pub options: toml::Table,
}

impl TargetConfig {
    pub fn from_table(id: &str, table: &toml::Table) -> Result<Self, ConfigError> {
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidTarget {
                name: id.to_string(),
                reason: e.message().to_string(),
            })
    }
}

impl SourceConfig {
    /// Name used in errors for the entry at `index`: its `name` when that is a
    /// string, else `#<position>` (1-based).
    pub fn entry_label(index: usize, table: &toml::Table) -> String {
        table
            .get("name")
            .and_then(toml::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index + 1))
    }

    pub fn from_table(index: usize, table: &toml::Table) -> Result<Self, ConfigError> {
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::InvalidEntry {
                name: Self::entry_label(index, table),
                reason: e.message().to_string(),
            })
    }

    /// Deserialize the kind-specific `[sources.options]` table.
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.options.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::options(&self.name, e.message()))
    }
}

impl FeedsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|cause| ConfigError::Read {
            path: path.to_path_buf(),
            cause,
        })?;
        Self::from_toml_str(&content).map_err(|cause| ConfigError::Parse {
            path: path.to_path_buf(),
            cause,
        })
    }

    /// Load using env var + fallback:
    /// 1) $FEEDS_CONFIG_PATH (must exist when set)
    /// 2) config/feeds.toml
    /// 3) empty config (nothing runs)
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_FEEDS_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(ConfigError::MissingPath(pb));
        }
        let default = PathBuf::from(DEFAULT_FEEDS_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        tracing::warn!(
            path = DEFAULT_FEEDS_CONFIG_PATH,
            "no feeds config found; no sources will run"
        );
        Ok(Self::default())
    }
}
