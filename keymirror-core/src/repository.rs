//! In-memory repository of watched resources.
//!
//! # Contract
//!
//! - [`Repository::set`] replaces the cached entry and emits an `Updated`
//!   event carrying a snapshot of the data.
//! - [`Repository::remove`] fails with [`RepositoryError::NotFound`] for an
//!   absent identity; otherwise it drops the entry and emits `Deleted`.
//! - Listeners are awaited one after another, in registration order, on the
//!   caller's task. A slow listener therefore stalls the caller: this is the
//!   backpressure point between the resource watcher and the synchronizer.
//!
//! The cache lock is released before any listener runs, so listeners may
//! read the repository back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::RepositoryError;
use crate::types::{RepositoryEvent, ResourceData, ResourceIdentity};

/// Receives every event emitted after registration.
#[async_trait]
pub trait RepositoryListener: Send + Sync {
    async fn handle(&self, event: &RepositoryEvent);
}

/// Latest known state of every watched resource, keyed by identity.
#[derive(Default)]
pub struct Repository {
    cache: RwLock<HashMap<ResourceIdentity, ResourceData>>,
    listeners: RwLock<Vec<Arc<dyn RepositoryListener>>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for all future events. There is no unregistration.
    pub fn add_listener(&self, listener: Arc<dyn RepositoryListener>) {
        self.listeners.write().push(listener);
    }

    /// Deliver `event` to every listener in registration order.
    pub async fn notify(&self, event: &RepositoryEvent) {
        let listeners: Vec<Arc<dyn RepositoryListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.handle(event).await;
        }
    }

    /// Cached data for `identity`.
    pub fn get(&self, identity: &ResourceIdentity) -> Result<ResourceData, RepositoryError> {
        tracing::trace!(name = %identity, "getting resource");
        match self.cache.read().get(identity) {
            Some(data) => Ok(data.clone()),
            None => {
                tracing::warn!(name = %identity, "resource not found");
                Err(RepositoryError::NotFound {
                    identity: identity.clone(),
                })
            }
        }
    }

    /// Snapshot of every cached resource, sorted by identity.
    pub fn get_all(&self) -> Vec<(ResourceIdentity, ResourceData)> {
        tracing::trace!("getting all resources");
        let mut all: Vec<_> = self
            .cache
            .read()
            .iter()
            .map(|(identity, data)| (identity.clone(), data.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        self.cache.read().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Replace the cached entry and emit `Updated`.
    pub async fn set(&self, identity: ResourceIdentity, data: ResourceData) {
        tracing::trace!(name = %identity, "setting resource");
        self.cache.write().insert(identity.clone(), data.clone());
        self.notify(&RepositoryEvent::updated(identity, data)).await;
    }

    /// Drop the cached entry and emit `Deleted`.
    pub async fn remove(&self, identity: &ResourceIdentity) -> Result<(), RepositoryError> {
        tracing::trace!(name = %identity, "deleting resource");
        if self.cache.write().remove(identity).is_none() {
            tracing::debug!(name = %identity, "resource not found");
            return Err(RepositoryError::NotFound {
                identity: identity.clone(),
            });
        }
        self.notify(&RepositoryEvent::deleted(identity.clone())).await;
        Ok(())
    }
}
