//! Reconciler configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use slo_rules::{DEFAULT_PROPAGATION_PREFIX, GenerationOptions};
use url::Url;

use crate::error::ConfigError;

/// Default glob of objective files.
pub const DEFAULT_CONFIG_FILES: &str = "/etc/pyrra/*.yaml";

/// Default Prometheus base URL.
pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";

/// Default output directory for rule files.
pub const DEFAULT_PROMETHEUS_FOLDER: &str = "/etc/prometheus/pyrra/";

/// Default quiet period before Prometheus is reloaded.
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_secs(5);

/// Capacity of the file and reload queues.
pub const QUEUE_CAPACITY: usize = 16;

/// Configuration for the filesystem reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemConfig {
    /// Glob of objective files to load and watch.
    pub config_files: String,
    /// Base URL of the Prometheus server to reload, checked by
    /// [`validate`](Self::validate).
    pub prometheus_url: String,
    /// Directory rule files are written to.
    pub prometheus_folder: PathBuf,
    /// Also write the generic rule group.
    pub generic_rules: bool,
    /// Rewrite integer `le` matchers for Prometheus 3.
    pub prometheus3_migration: bool,
    /// Quiet period before a reload is sent.
    pub reload_debounce: Duration,
    /// Prefix of labels and annotations copied onto rules.
    pub propagation_prefix: String,
    /// Log failing files and keep going instead of stopping the pipeline.
    pub continue_on_error: bool,
    /// Address serving `/metrics`. Nothing is served when unset.
    pub metrics_addr: Option<SocketAddr>,
}

impl FilesystemConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_files: DEFAULT_CONFIG_FILES.to_string(),
            prometheus_url: DEFAULT_PROMETHEUS_URL.to_string(),
            prometheus_folder: PathBuf::from(DEFAULT_PROMETHEUS_FOLDER),
            generic_rules: false,
            prometheus3_migration: false,
            reload_debounce: DEFAULT_RELOAD_DEBOUNCE,
            propagation_prefix: DEFAULT_PROPAGATION_PREFIX.to_string(),
            continue_on_error: false,
            metrics_addr: None,
        }
    }

    /// Set the objective file glob.
    #[must_use]
    pub fn with_config_files(mut self, pattern: impl Into<String>) -> Self {
        self.config_files = pattern.into();
        self
    }

    /// Set the Prometheus base URL.
    #[must_use]
    pub fn with_prometheus_url(mut self, url: impl Into<String>) -> Self {
        self.prometheus_url = url.into();
        self
    }

    /// Set the rule output directory.
    #[must_use]
    pub fn with_prometheus_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.prometheus_folder = folder.into();
        self
    }

    /// Enable or disable the generic rule group.
    #[must_use]
    pub const fn with_generic_rules(mut self, enabled: bool) -> Self {
        self.generic_rules = enabled;
        self
    }

    /// Enable or disable the Prometheus 3 `le` migration.
    #[must_use]
    pub const fn with_prometheus3_migration(mut self, enabled: bool) -> Self {
        self.prometheus3_migration = enabled;
        self
    }

    /// Set the reload debounce.
    #[must_use]
    pub const fn with_reload_debounce(mut self, debounce: Duration) -> Self {
        self.reload_debounce = debounce;
        self
    }

    /// Set the propagation prefix.
    #[must_use]
    pub fn with_propagation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.propagation_prefix = prefix.into();
        self
    }

    /// Keep going when a file fails.
    #[must_use]
    pub const fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Serve the reconcile counters on `addr`.
    #[must_use]
    pub const fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the config file pattern is empty
    /// - the Prometheus URL does not parse or cannot be a base URL
    /// - the reload debounce is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_files.trim().is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        self.base_url()?;
        if self.reload_debounce.is_zero() {
            return Err(ConfigError::ZeroDebounce);
        }
        Ok(())
    }

    fn base_url(&self) -> Result<Url, ConfigError> {
        let url = parse_url(&self.prometheus_url)?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl {
                url: self.prometheus_url.clone(),
                reason: "cannot be a base url".to_string(),
            });
        }
        Ok(url)
    }

    /// The options passed to the rule compiler.
    #[must_use]
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            enable_prometheus3_migration: self.prometheus3_migration,
            generic_rules: self.generic_rules,
            propagation_prefix: self.propagation_prefix.clone(),
            ..GenerationOptions::default()
        }
    }

    /// The directory watched for changes: the parent of the config glob.
    #[must_use]
    pub fn watch_dir(&self) -> PathBuf {
        match Path::new(&self.config_files).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// The reload endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the base URL is invalid or the
    /// endpoint cannot be joined onto it.
    pub fn reload_url(&self) -> Result<Url, ConfigError> {
        let mut base = self.base_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("-/reload").map_err(|e| ConfigError::InvalidUrl {
            url: self.prometheus_url.clone(),
            reason: e.to_string(),
        })
    }
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a URL flag.
///
/// # Errors
///
/// Returns `ConfigError::InvalidUrl` if the text is not an absolute URL.
pub fn parse_url(url: &str) -> Result<Url, ConfigError> {
    Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Parses a duration flag such as `5s` or `1m30s`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidDuration` if the text is not a duration.
pub fn parse_debounce(text: &str) -> Result<Duration, ConfigError> {
    slo_rules::parse_duration(text).map_err(|_| ConfigError::InvalidDuration(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FilesystemConfig::new();
        assert_eq!(config, FilesystemConfig::default());
        assert_eq!(config.config_files, "/etc/pyrra/*.yaml");
        assert_eq!(config.prometheus_url, "http://localhost:9090");
        assert_eq!(config.reload_debounce, Duration::from_secs(5));
        assert!(!config.generic_rules);
        assert!(!config.continue_on_error);
        assert_eq!(config.metrics_addr, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_prometheus_url_parses() {
        let url = parse_url(DEFAULT_PROMETHEUS_URL).unwrap();
        assert!(!url.cannot_be_a_base());
    }

    #[test]
    fn builder_sets_fields() {
        let config = FilesystemConfig::new()
            .with_config_files("/tmp/slo/*.yml")
            .with_prometheus_folder("/tmp/rules")
            .with_generic_rules(true)
            .with_prometheus3_migration(true)
            .with_propagation_prefix("example.com/")
            .with_continue_on_error(true);

        let options = config.generation_options();
        assert!(options.generic_rules);
        assert!(options.enable_prometheus3_migration);
        assert_eq!(options.propagation_prefix, "example.com/");
        assert!(config.continue_on_error);
        assert_eq!(config.prometheus_folder, PathBuf::from("/tmp/rules"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let empty = FilesystemConfig::new().with_config_files("  ");
        assert_eq!(empty.validate(), Err(ConfigError::EmptyPattern));

        let zero = FilesystemConfig::new().with_reload_debounce(Duration::ZERO);
        assert_eq!(zero.validate(), Err(ConfigError::ZeroDebounce));

        let mailto = FilesystemConfig::new().with_prometheus_url("mailto:ops@example.com");
        assert!(matches!(mailto.validate(), Err(ConfigError::InvalidUrl { .. })));

        let garbage = FilesystemConfig::new().with_prometheus_url("not a url");
        assert!(matches!(garbage.validate(), Err(ConfigError::InvalidUrl { .. })));
        assert!(garbage.reload_url().is_err());
    }

    #[test]
    fn watch_dir_is_glob_parent() {
        let config = FilesystemConfig::new();
        assert_eq!(config.watch_dir(), PathBuf::from("/etc/pyrra"));

        let relative = config.with_config_files("*.yaml");
        assert_eq!(relative.watch_dir(), PathBuf::from("."));
    }

    #[test]
    fn reload_url_keeps_path_prefix() {
        let config = FilesystemConfig::new();
        assert_eq!(
            config.reload_url().unwrap().as_str(),
            "http://localhost:9090/-/reload"
        );

        let prefixed = config.with_prometheus_url("http://prom:9090/prometheus");
        assert_eq!(
            prefixed.reload_url().unwrap().as_str(),
            "http://prom:9090/prometheus/-/reload"
        );
    }

    #[test]
    fn parses_flags() {
        assert_eq!(parse_debounce("1m30s").unwrap(), Duration::from_secs(90));
        assert!(matches!(
            parse_debounce("soon"),
            Err(ConfigError::InvalidDuration(_))
        ));
        assert!(parse_url("not a url").is_err());
    }
}
