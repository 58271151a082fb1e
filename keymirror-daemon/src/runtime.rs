use std::fs;
use std::path::Path;
use std::sync::Arc;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use keymirror_core::{Repository, ResourceData, ResourceIdentity};
use keymirror_sync::store::read_fields;
use keymirror_sync::{ExternalStore, FileStore, RedisStore, Synchronizer};

use crate::config::DaemonConfig;
use crate::error::{io_err, DaemonError};
use crate::manifest::{is_manifest_path, ManifestApplier, ManifestIndex, ManifestSource};

/// Wired components of a running daemon.
pub struct Daemon {
    pub repository: Arc<Repository>,
    pub synchronizer: Arc<Synchronizer>,
    pub source: Arc<ManifestSource>,
    pub store: Arc<dyn ExternalStore>,
}

impl Daemon {
    /// [`Daemon::with_store`] over the file store in `config.store_dir`.
    pub fn new(config: &DaemonConfig) -> Self {
        Self::with_store(config, Arc::new(FileStore::new(&config.store_dir)))
    }

    /// Build the repository, applier and synchronizer over `store`, and
    /// register the synchronizer on the repository. Nothing is read yet.
    pub fn with_store(config: &DaemonConfig, store: Arc<dyn ExternalStore>) -> Self {
        let index = Arc::new(Mutex::new(ManifestIndex::default()));
        let repository = Arc::new(Repository::new());
        let applier = Arc::new(ManifestApplier::new(index.clone()));
        let synchronizer = Arc::new(Synchronizer::new(
            store.clone(),
            applier,
            config.sync_options(),
        ));
        repository.add_listener(synchronizer.clone());
        let source = Arc::new(ManifestSource::new(
            &config.manifests_dir,
            &config.managed_annotation,
            index,
            repository.clone(),
        ));
        Self {
            repository,
            synchronizer,
            source,
            store,
        }
    }

    pub async fn shutdown(&self) {
        tracing::info!(jobs = self.synchronizer.job_count(), "stopping synchronization jobs");
        self.synchronizer.stop().await;
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(&config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until ctrl-c or a watcher failure.
pub async fn run(mut config: DaemonConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config)?;
    // Watcher events carry canonical paths; the manifest index must match.
    config.manifests_dir =
        fs::canonicalize(&config.manifests_dir).map_err(|e| io_err(&config.manifests_dir, e))?;

    let store = open_store(&config).await?;
    let daemon = Daemon::with_store(&config, store);
    daemon.source.scan().await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let source = daemon.source.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watcher_task(source, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, signal_result) = tokio::join!(watcher_handle, signal_handle);
    daemon.shutdown().await;

    handle_join("watcher", watcher_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Read the store's fields for `identity` without starting the daemon.
pub fn inspect_blocking(
    config: &DaemonConfig,
    identity: &ResourceIdentity,
) -> Result<ResourceData, DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async {
        let store = open_store(config).await?;
        Ok::<_, DaemonError>(read_fields(&*store, &identity.store_key()).await?)
    })
}

/// Redis when `redis_url` is configured, else the file store.
pub async fn open_store(config: &DaemonConfig) -> Result<Arc<dyn ExternalStore>, DaemonError> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisStore::connect(url).await?)),
        None => {
            tracing::debug!(root = %config.store_dir.display(), "using file store");
            Ok(Arc::new(FileStore::new(&config.store_dir)))
        }
    }
}

async fn watcher_task(
    source: Arc<ManifestSource>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(source.dir(), RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %source.dir().display(), "watching manifest directory");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };

                for path in event.paths {
                    if !is_manifest_path(&path) {
                        continue;
                    }
                    dispatch(&source, &event.kind, &path).await;
                }
            }
        }
    }

    Ok(())
}

async fn dispatch(source: &ManifestSource, kind: &EventKind, path: &Path) {
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            if let Err(err) = source.file_changed(path).await {
                tracing::warn!(path = %path.display(), error = %err, "unable to process manifest");
            }
        }
        EventKind::Remove(_) => source.file_removed(path).await,
        _ => {}
    }
}

fn ensure_runtime_dirs(config: &DaemonConfig) -> Result<(), DaemonError> {
    for dir in [&config.manifests_dir, &config.store_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task(format!("{task} task join failure: {err}"))),
    }
}

fn init_tracing(config: &DaemonConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
