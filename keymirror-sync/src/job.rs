//! Per-resource synchronization job.
//!
//! A [`SyncJob`] owns a private snapshot of one resource's data together with
//! the content hash last written to or accepted from the external store.
//!
//! ## push: desired data → store
//!
//! 1. Substitute the sentinel field when the snapshot is empty.
//! 2. Read the store's current fields for the key.
//! 3. Remove fields present in the store but absent from the snapshot.
//! 4. Upsert the snapshot's fields.
//! 5. Record the hash of the snapshot (sentinel excluded).
//!
//! ## pull: store → authoritative resource
//!
//! 1. Read the store's fields; an empty key is initialized with a push.
//! 2. Drop a sentinel that sits next to real fields, in the store and in memory.
//! 3. Skip when the hash equals the last recorded hash.
//! 4. Otherwise apply the fetched data to the resource, then adopt it as the
//!    snapshot and record its hash. A failed apply leaves the hash untouched
//!    so the next tick retries.
//!
//! Both steps run under the job's lock. The delete-then-set sequence in push
//! is not atomic; a crash in between is repaired by the next push or pull.
//!
//! ## Lifecycle
//!
//! `Stopped → Running → Stopped`. [`SyncJob::start`] spawns one poll task;
//! [`SyncJob::stop`] cancels it. The cancellation token lives outside the
//! job lock, so `stop` never waits behind a pull: an in-flight pull races the
//! token and is dropped, releasing the lock. The task re-checks its token
//! under the lock before every pull, so once `stop` returns the job performs
//! no more store I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use keymirror_core::{ResourceData, ResourceIdentity};

use crate::apply::ResourceApplier;
use crate::content_hash::{content_hash, ContentHash, SENTINEL_FIELD};
use crate::error::SyncError;
use crate::store::{read_fields, ExternalStore};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables shared by every job of a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Sleep between two pulls of the same job.
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Stale fields removed from the store, sorted.
    pub removed: Vec<String>,
    pub hash: ContentHash,
}

/// Outcome of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The key was empty and has been written from the snapshot.
    Initialized(PushOutcome),
    /// Store content matches the last recorded hash.
    Unchanged,
    /// Store content differed and was applied to the resource.
    Applied { hash: ContentHash },
    /// The job was stopped before or during the pull.
    Cancelled,
}

struct JobState {
    data: ResourceData,
    hash: Option<ContentHash>,
    running: bool,
    handle: Option<JoinHandle<()>>,
}

pub struct SyncJob {
    identity: ResourceIdentity,
    key: String,
    store: Arc<dyn ExternalStore>,
    applier: Arc<dyn ResourceApplier>,
    options: SyncOptions,
    // Token of the current poll task; swapped by `start`.
    cancel: parking_lot::Mutex<CancellationToken>,
    state: Mutex<JobState>,
}

impl SyncJob {
    /// A stopped job with an empty hash.
    pub fn new(
        identity: ResourceIdentity,
        data: ResourceData,
        store: Arc<dyn ExternalStore>,
        applier: Arc<dyn ResourceApplier>,
        options: SyncOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: identity.store_key(),
            identity,
            store,
            applier,
            options,
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            state: Mutex::new(JobState {
                data,
                hash: None,
                running: false,
                handle: None,
            }),
        })
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub async fn data(&self) -> ResourceData {
        self.state.lock().await.data.clone()
    }

    pub async fn hash(&self) -> Option<ContentHash> {
        self.state.lock().await.hash.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Write the current snapshot to the store.
    pub async fn push(&self) -> Result<PushOutcome, SyncError> {
        let mut state = self.state.lock().await;
        self.push_locked(&mut state).await
    }

    /// Replace the snapshot with `data` and push it.
    pub async fn replace_data_and_push(
        &self,
        data: ResourceData,
    ) -> Result<PushOutcome, SyncError> {
        let mut state = self.state.lock().await;
        state.data = data;
        self.push_locked(&mut state).await
    }

    /// Reconcile store content back into the resource.
    pub async fn pull(&self) -> Result<PullOutcome, SyncError> {
        let mut state = self.state.lock().await;
        self.pull_locked(&mut state).await
    }

    /// Launch the poll task. No-op while already running.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.running {
            return;
        }
        state.running = true;
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        let job = Arc::clone(self);
        state.handle = Some(tokio::spawn(async move { job.run(cancel).await }));
        tracing::debug!(name = %self.identity, "synchronization job started");
    }

    /// Cancel the poll task. Does not wait for an in-flight pull, which is
    /// abandoned; no store call is issued after this returns.
    pub async fn stop(&self) {
        self.cancel.lock().cancel();
        self.state.lock().await.running = false;
        tracing::debug!(name = %self.identity, "synchronization job stopped");
    }

    /// Wait for the poll task to exit. Returns at once if none was started.
    pub async fn join(&self) {
        let handle = self.state.lock().await.handle.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(name = %self.identity, error = %err, "poll task failed");
            }
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(err) = self.poll_once(&cancel).await {
                tracing::error!(
                    name = %self.identity,
                    error = %err,
                    "unable to pull resource from store",
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
        tracing::trace!(name = %self.identity, "poll task exited");
    }

    async fn poll_once(&self, cancel: &CancellationToken) -> Result<PullOutcome, SyncError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(PullOutcome::Cancelled),
            outcome = async {
                let mut state = self.state.lock().await;
                if cancel.is_cancelled() {
                    return Ok(PullOutcome::Cancelled);
                }
                self.pull_locked(&mut state).await
            } => outcome,
        }
    }

    async fn push_locked(&self, state: &mut JobState) -> Result<PushOutcome, SyncError> {
        tracing::info!(name = %self.identity, "writing resource data to store");

        let mut desired = state.data.clone();
        if desired.is_empty() {
            tracing::debug!(name = %self.identity, "resource data is empty");
            desired.insert(SENTINEL_FIELD.to_owned(), String::new());
        }

        let current = read_fields(self.store.as_ref(), &self.key).await?;

        let mut removed: Vec<String> = current
            .keys()
            .filter(|field| !desired.contains_key(*field))
            .cloned()
            .collect();
        removed.sort();

        if !removed.is_empty() {
            self.store.delete_fields(&self.key, &removed).await?;
        }

        self.store.set_fields(&self.key, &desired).await?;

        let hash = content_hash(&desired);
        state.hash = Some(hash.clone());

        tracing::debug!(name = %self.identity, removed = removed.len(), "resource data written");
        Ok(PushOutcome { removed, hash })
    }

    async fn pull_locked(&self, state: &mut JobState) -> Result<PullOutcome, SyncError> {
        let mut fields = read_fields(self.store.as_ref(), &self.key).await?;

        if fields.is_empty() {
            tracing::debug!(name = %self.identity, "resource data not found in store");
            return Ok(PullOutcome::Initialized(self.push_locked(state).await?));
        }

        if fields.len() > 1 && fields.contains_key(SENTINEL_FIELD) {
            self.store
                .delete_fields(&self.key, &[SENTINEL_FIELD.to_owned()])
                .await?;
        }
        fields.remove(SENTINEL_FIELD);

        let hash = content_hash(&fields);
        if state.hash.as_ref() == Some(&hash) {
            tracing::trace!(name = %self.identity, "resource data unchanged");
            return Ok(PullOutcome::Unchanged);
        }

        tracing::info!(name = %self.identity, "applying store data to resource");
        self.applier.apply(&self.identity, &fields).await?;

        state.data = fields;
        state.hash = Some(hash.clone());
        tracing::debug!(name = %self.identity, "resource data applied");
        Ok(PullOutcome::Applied { hash })
    }
}
