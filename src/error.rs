//! Typed configuration errors.
//!
//! Every per-source variant names the source (or target) it belongs to, so the
//! engine can skip exactly that source and start the rest.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading feeds config from {path}")]
    Read {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("parsing feeds config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        cause: toml::de::Error,
    },

    #[error("FEEDS_CONFIG_PATH points to non-existent path {0}")]
    MissingPath(PathBuf),

    #[error("source `{name}`: malformed entry: {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("source `{name}`: unknown kind `{kind}`")]
    UnknownKind { name: String, kind: String },

    #[error("source `{name}`: unknown delivery target `{target}`")]
    UnknownTarget { name: String, target: String },

    #[error("source `{name}`: delivery target `{target}` failed to initialize")]
    UnavailableTarget { name: String, target: String },

    #[error("`{name}`: environment variable `{var}` is missing or empty")]
    MissingEnv { name: String, var: String },

    #[error("source `{name}`: invalid options: {reason}")]
    InvalidOptions { name: String, reason: String },

    #[error("source `{name}`: invalid cadence: {reason}")]
    InvalidCadence { name: String, reason: String },

    #[error("source `{name}`: invalid template: {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("target `{name}`: {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("duplicate source name `{0}`")]
    DuplicateName(String),
}

impl ConfigError {
    pub fn options(name: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidOptions {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn cadence(name: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidCadence {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
