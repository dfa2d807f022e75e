//! slo-filesystem - objective file reconciler
//!
//! Watches a directory of `ServiceLevelObjective` files, writes one
//! Prometheus rule file per objective and reloads Prometheus.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use slo_filesystem::config::{parse_debounce, parse_url};
use slo_filesystem::{FilesystemConfig, Pipeline, PrometheusReloader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use url::Url;

#[derive(Parser)]
#[command(name = "slo-filesystem")]
#[command(about = "Generates Prometheus rules from service level objective files")]
#[command(version)]
struct Cli {
    /// Glob of objective files
    #[arg(long, env = "SLO_CONFIG_FILES", default_value = "/etc/pyrra/*.yaml")]
    config_files: String,

    /// Prometheus base URL, reloaded after changes
    #[arg(long, env = "SLO_PROMETHEUS_URL", default_value = "http://localhost:9090", value_parser = parse_url)]
    prometheus_url: Url,

    /// Directory rule files are written to
    #[arg(long, env = "SLO_PROMETHEUS_FOLDER", default_value = "/etc/prometheus/pyrra/")]
    prometheus_folder: PathBuf,

    /// Also write generic rules for dashboards
    #[arg(long, env = "SLO_GENERIC_RULES")]
    generic_rules: bool,

    /// Rewrite integer `le` matchers to also match Prometheus 3 bucket labels
    #[arg(long, env = "SLO_PROMETHEUS3_MIGRATION")]
    prometheus3_migration: bool,

    /// Quiet period before Prometheus is reloaded
    #[arg(long, env = "SLO_RELOAD_DEBOUNCE", default_value = "5s", value_parser = parse_debounce)]
    reload_debounce: Duration,

    /// Prefix of objective labels and annotations copied onto rules
    #[arg(long, env = "SLO_PROPAGATION_PREFIX", default_value = "pyrra.dev/")]
    propagation_prefix: String,

    /// Log failing files and keep going instead of exiting
    #[arg(long, env = "SLO_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Address serving the reconcile counters on /metrics
    #[arg(long, env = "SLO_METRICS_ADDR", default_value = "0.0.0.0:9444")]
    metrics_addr: SocketAddr,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "SLO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "SLO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<FilesystemConfig> {
        let config = FilesystemConfig::new()
            .with_config_files(self.config_files)
            .with_prometheus_url(self.prometheus_url)
            .with_prometheus_folder(self.prometheus_folder)
            .with_generic_rules(self.generic_rules)
            .with_prometheus3_migration(self.prometheus3_migration)
            .with_reload_debounce(self.reload_debounce)
            .with_propagation_prefix(self.propagation_prefix)
            .with_continue_on_error(self.continue_on_error)
            .with_metrics_addr(self.metrics_addr);
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let config = cli.into_config()?;
    let reloader = PrometheusReloader::new(config.reload_url()?)?;
    info!(
        config_files = %config.config_files,
        prometheus = %config.prometheus_url,
        generic_rules = config.generic_rules,
        prometheus3_migration = config.prometheus3_migration,
        "starting slo-filesystem"
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
        }
        shutdown.cancel();
    });

    let pipeline = Pipeline::new(config, reloader);
    let metrics = pipeline.metrics();

    if let Err(e) = pipeline.run(cancel).await {
        error!(
            error = %e,
            reconciles = metrics.reconciles(),
            errors = metrics.errors(),
            "pipeline stopped"
        );
        return Err(e.into());
    }

    info!(reconciles = metrics.reconciles(), "shutdown complete");
    Ok(())
}
