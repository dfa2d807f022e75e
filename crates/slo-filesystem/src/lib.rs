//! Filesystem reconciler for service level objectives.
//!
//! `slo-filesystem` reads objective files from a directory, compiles each one
//! into a Prometheus rule file with `slo-rules`, and asks Prometheus to
//! reload once a burst of changes has settled.
//!
//! # Architecture
//!
//! ```text
//! glob ──┐
//!        ├─> file queue ─> worker ─> rule files + registry ─> reload signals ─> debouncer ─> POST /-/reload
//! notify ┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use slo_filesystem::{FilesystemConfig, Pipeline, PrometheusReloader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = FilesystemConfig::new()
//!     .with_config_files("/etc/pyrra/*.yaml")
//!     .with_prometheus_folder("/etc/prometheus/pyrra/");
//! config.validate()?;
//!
//! let reloader = PrometheusReloader::new(config.reload_url()?)?;
//! let pipeline = Pipeline::new(config, reloader);
//! let registry = pipeline.registry();
//!
//! pipeline.run(CancellationToken::new()).await?;
//! println!("{} objectives", registry.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod debounce;
pub mod error;
pub mod metrics;
pub mod objective_file;
pub mod pipeline;
pub mod registry;
pub mod reload;
pub mod server;

// Re-export main types at crate root
pub use config::FilesystemConfig;
pub use debounce::ReloadDebouncer;
pub use error::{ConfigError, FilesystemError, ReloadError, Result};
pub use metrics::ReconcileMetrics;
pub use objective_file::{ObjectiveFile, read_objective};
pub use pipeline::{Pipeline, Reconciled, reconcile_file};
pub use registry::ObjectiveRegistry;
pub use reload::{PrometheusReloader, Reloader};
pub use server::{metrics_router, serve_metrics};
