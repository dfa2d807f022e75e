//! The reconciliation pipeline.
//!
//! Four tasks share one cancellation token:
//!
//! - the loader queues every file matching the config glob once at startup
//! - the watcher queues files of the config directory when they are written
//! - the worker turns each queued file into a rule file and signals a reload
//! - the debouncer reloads Prometheus once the signals have quietened
//!
//! A fifth task serves `/metrics` when a metrics address is configured.
//!
//! By default a failing file stops the whole pipeline. With
//! `continue_on_error` the file is logged and skipped instead.

use std::fs;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use slo_rules::{GenerationOptions, Objective, compile};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{FilesystemConfig, QUEUE_CAPACITY};
use crate::debounce::ReloadDebouncer;
use crate::error::{FilesystemError, Result};
use crate::metrics::ReconcileMetrics;
use crate::objective_file::read_objective;
use crate::registry::ObjectiveRegistry;
use crate::reload::Reloader;
use crate::server::serve_metrics;

/// The outcome of reconciling one objective file.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The objective read from the file.
    pub objective: Objective,
    /// The rule file that was written.
    pub output: PathBuf,
}

/// Returns true for `.yaml` and `.yml` files.
#[must_use]
pub fn is_objective_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Reads one objective file, compiles it and writes its rule file to
/// `output_dir` under the same base name.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded, the objective is
/// invalid, or the rule file cannot be written.
pub fn reconcile_file(
    path: &Path,
    output_dir: &Path,
    options: &GenerationOptions,
) -> Result<Reconciled> {
    let objective = read_objective(path, &options.propagation_prefix)?;
    let rules = compile(&objective, options)?.into_rule_file();
    let yaml = serde_yaml::to_string(&rules)?;

    let file_name = path.file_name().ok_or_else(|| {
        FilesystemError::InvalidObjective(format!("{} has no file name", path.display()))
    })?;
    let output = output_dir.join(file_name);
    write_rule_file(&output, &yaml)?;

    Ok(Reconciled { objective, output })
}

fn write_rule_file(path: &Path, contents: &str) -> Result<()> {
    let write_err = |source| FilesystemError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(path, contents).map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).map_err(write_err)?;
    }

    Ok(())
}

/// The supervised set of pipeline tasks.
#[derive(Debug)]
pub struct Pipeline<R> {
    config: FilesystemConfig,
    registry: ObjectiveRegistry,
    metrics: ReconcileMetrics,
    reloader: R,
}

impl<R: Reloader + 'static> Pipeline<R> {
    /// Creates a pipeline with an empty registry.
    pub fn new(config: FilesystemConfig, reloader: R) -> Self {
        let registry = ObjectiveRegistry::new(config.propagation_prefix.clone());
        Self {
            config,
            registry,
            metrics: ReconcileMetrics::new(),
            reloader,
        }
    }

    /// The registry the worker fills. Clones share state with the pipeline.
    #[must_use]
    pub fn registry(&self) -> ObjectiveRegistry {
        self.registry.clone()
    }

    /// The reconcile counters.
    #[must_use]
    pub fn metrics(&self) -> ReconcileMetrics {
        self.metrics.clone()
    }

    /// Runs all tasks until `cancel` fires or a task fails.
    ///
    /// # Errors
    ///
    /// Returns the first task error. The other tasks are cancelled and
    /// awaited before returning.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let (files_tx, files_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (reload_tx, reload_rx) = mpsc::channel(QUEUE_CAPACITY);

        let mut tasks = JoinSet::new();
        if let Some(addr) = self.config.metrics_addr {
            tasks.spawn(serve_metrics(addr, self.metrics.clone(), cancel.clone()));
        }

        let worker = FileWorker {
            output_dir: self.config.prometheus_folder.clone(),
            options: self.config.generation_options(),
            continue_on_error: self.config.continue_on_error,
            registry: self.registry,
            metrics: self.metrics,
        };
        let debouncer = ReloadDebouncer::new(self.reloader, reload_rx, self.config.reload_debounce);

        tasks.spawn(load_files(
            self.config.config_files.clone(),
            files_tx.clone(),
            cancel.clone(),
        ));
        tasks.spawn(watch_files(self.config.watch_dir(), files_tx, cancel.clone()));
        tasks.spawn(worker.run(files_rx, reload_tx, cancel.clone()));
        let debounce_cancel = cancel.clone();
        tasks.spawn(async move {
            debouncer.run(debounce_cancel).await;
            Ok(())
        });

        info!(
            config_files = %self.config.config_files,
            output = %self.config.prometheus_folder.display(),
            "pipeline started"
        );

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => FilesystemError::Task(e.to_string()),
            };
            if first_error.is_none() {
                error!(error = %err, "pipeline task failed, shutting down");
                cancel.cancel();
                first_error = Some(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Queues every file matching `pattern`, then idles until cancelled.
async fn load_files(
    pattern: String,
    files: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    let paths = glob::glob(&pattern).map_err(|e| FilesystemError::Pattern(e.to_string()))?;

    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            sent = files.send(path) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }

    cancel.cancelled().await;
    Ok(())
}

/// Queues files of `dir` whose contents were written.
async fn watch_files(
    dir: PathBuf,
    files: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |event: notify::Result<Event>| {
            // The receiver is gone once the task stops.
            let _ = events_tx.send(event);
        },
        notify::Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    debug!(dir = %dir.display(), "watching for changes");

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => return Ok(()),
            },
        };

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "watcher error");
                continue;
            }
        };
        if !is_write(&event.kind) {
            continue;
        }

        for path in event.paths {
            debug!(file = %path.display(), "file changed");
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                sent = files.send(path) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

const fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
    )
}

/// Reconciles queued files one at a time.
struct FileWorker {
    output_dir: PathBuf,
    options: GenerationOptions,
    continue_on_error: bool,
    registry: ObjectiveRegistry,
    metrics: ReconcileMetrics,
}

impl FileWorker {
    async fn run(
        self,
        mut files: mpsc::Receiver<PathBuf>,
        reload: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let path = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                path = files.recv() => match path {
                    Some(path) => path,
                    None => return Ok(()),
                },
            };

            if !is_objective_file(&path) {
                warn!(file = %path.display(), "skipping file without .yaml or .yml extension");
                continue;
            }

            self.metrics.inc_reconciles();
            match self.reconcile(path.clone()).await {
                Ok(reconciled) => {
                    info!(
                        file = %path.display(),
                        output = %reconciled.output.display(),
                        slo = reconciled.objective.name(),
                        "reconciled objective"
                    );
                    self.registry.set(reconciled.objective);
                    // A full queue already holds a pending reload.
                    let _ = reload.try_send(());
                }
                Err(e) => {
                    self.metrics.inc_errors();
                    if !self.continue_on_error {
                        return Err(e);
                    }
                    error!(file = %path.display(), error = %e, "failed to reconcile objective");
                }
            }
        }
    }

    async fn reconcile(&self, path: PathBuf) -> Result<Reconciled> {
        let output_dir = self.output_dir.clone();
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || reconcile_file(&path, &output_dir, &options))
            .await
            .map_err(|e| FilesystemError::Task(e.to_string()))?
    }
}
