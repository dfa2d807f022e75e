//! Error types for the filesystem reconciler.

use std::path::PathBuf;

use slo_rules::RuleError;
use thiserror::Error;

/// Errors that stop a file from being reconciled.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// Reading an objective file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a rule file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// The file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The objective file is not valid YAML for an objective.
    #[error("failed to decode objective: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// The objective is well-formed YAML but not a valid objective.
    #[error("invalid objective: {0}")]
    InvalidObjective(String),

    /// Rule compilation failed.
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// The config file pattern could not be expanded.
    #[error("invalid config file pattern: {0}")]
    Pattern(String),

    /// The directory watcher failed.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// The metrics server could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: std::net::SocketAddr,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A pipeline task ended abnormally.
    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// Invalid command line or environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The config file pattern is empty.
    #[error("config file pattern cannot be empty")]
    EmptyPattern,

    /// The Prometheus URL cannot be used as a base URL.
    #[error("invalid prometheus url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The reload debounce is zero.
    #[error("reload debounce must be positive")]
    ZeroDebounce,

    /// A duration flag failed to parse.
    #[error("invalid duration {0:?}")]
    InvalidDuration(String),
}

/// Errors calling the Prometheus reload endpoint.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// The request could not be sent or the response not read.
    #[error("reload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Prometheus answered with a non-2xx status.
    #[error("reload returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, FilesystemError>;
