//! Maps resource identities to long-lived [`SyncJob`]s.
//!
//! The synchronizer listens on the repository:
//!
//! - `Updated` for a known identity replaces the job's snapshot and pushes.
//! - `Updated` for a new identity registers a job, pushes, then starts it.
//! - `Deleted` stops the job and drops it from the registry. The store key
//!   is left as is.
//!
//! The registry lock covers lookups and map mutation only, never store I/O,
//! so unrelated resources progress independently. Push failures during event
//! handling are logged; the poll loop converges the store later.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use keymirror_core::{
    RepositoryEvent, RepositoryEventType, RepositoryListener, ResourceData, ResourceIdentity,
};

use crate::apply::ResourceApplier;
use crate::job::{SyncJob, SyncOptions};
use crate::store::ExternalStore;

pub struct Synchronizer {
    store: Arc<dyn ExternalStore>,
    applier: Arc<dyn ResourceApplier>,
    options: SyncOptions,
    jobs: Mutex<HashMap<ResourceIdentity, Arc<SyncJob>>>,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn ExternalStore>,
        applier: Arc<dyn ResourceApplier>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            applier,
            options,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn job(&self, identity: &ResourceIdentity) -> Option<Arc<SyncJob>> {
        self.jobs.lock().get(identity).cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Registered identities, sorted.
    pub fn identities(&self) -> Vec<ResourceIdentity> {
        let mut ids: Vec<_> = self.jobs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every registered job. Used at shutdown; does not wait for the
    /// poll tasks to exit.
    pub async fn stop(&self) {
        let jobs: Vec<Arc<SyncJob>> = self.jobs.lock().values().cloned().collect();
        for job in jobs {
            job.stop().await;
        }
    }

    async fn handle_updated(&self, identity: &ResourceIdentity, data: ResourceData) {
        let (job, created) = {
            let mut jobs = self.jobs.lock();
            match jobs.entry(identity.clone()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    let job = SyncJob::new(
                        identity.clone(),
                        data.clone(),
                        Arc::clone(&self.store),
                        Arc::clone(&self.applier),
                        self.options,
                    );
                    entry.insert(Arc::clone(&job));
                    (job, true)
                }
            }
        };

        if created {
            tracing::debug!(name = %identity, "creating synchronization job");
            if let Err(err) = job.push().await {
                tracing::error!(name = %identity, error = %err, "initial push failed");
            }
            job.start().await;
        } else if let Err(err) = job.replace_data_and_push(data).await {
            tracing::error!(name = %identity, error = %err, "push after update failed");
        }
    }

    async fn handle_deleted(&self, identity: &ResourceIdentity) {
        let Some(job) = self.job(identity) else {
            tracing::warn!(name = %identity, "job not found");
            return;
        };
        job.stop().await;
        self.jobs.lock().remove(identity);
        tracing::debug!(name = %identity, "synchronization job removed");
    }
}

#[async_trait]
impl RepositoryListener for Synchronizer {
    async fn handle(&self, event: &RepositoryEvent) {
        match event.event_type {
            RepositoryEventType::Updated => {
                let data = event.data.clone().unwrap_or_default();
                self.handle_updated(&event.identity, data).await;
            }
            RepositoryEventType::Deleted => self.handle_deleted(&event.identity).await,
            other => {
                tracing::warn!(name = %event.identity, event_type = %other, "unsupported event type");
            }
        }
    }
}
