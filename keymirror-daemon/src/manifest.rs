//! Resource manifests: the authoritative side of the mirror.
//!
//! Each `*.yaml` file in the manifests directory describes one resource:
//!
//! ```yaml
//! namespace: default
//! name: app-config
//! annotations:
//!   keymirror.dev/managed: "true"
//! data:
//!   LOG_LEVEL: info
//! ```
//!
//! [`ManifestSource`] turns file changes into repository calls. Only
//! manifests carrying the managed annotation reach the repository; a file
//! that loses the annotation, gains a `deletionTimestamp` or disappears is
//! removed. [`ManifestApplier`] writes store-side edits back into the file.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use keymirror_core::{Repository, RepositoryError, ResourceData, ResourceIdentity};
use keymirror_sync::{ApplyError, ResourceApplier};

use crate::error::{io_err, DaemonError};

// ---------------------------------------------------------------------------
// Manifest document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Manifest {
    pub fn identity(&self) -> Result<ResourceIdentity, RepositoryError> {
        ResourceIdentity::try_new(&self.namespace, &self.name)
    }

    pub fn is_managed(&self, annotation: &str) -> bool {
        self.annotations.contains_key(annotation)
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn resource_data(&self) -> ResourceData {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// `true` for `*.yaml` / `*.yml` files; temporary files are skipped.
pub fn is_manifest_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// Read and parse a manifest. `Ok(None)` when the file does not exist.
pub async fn read_manifest(path: &Path) -> Result<Option<Manifest>, DaemonError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| DaemonError::Manifest {
            path: path.to_path_buf(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Path ↔ identity index
// ---------------------------------------------------------------------------

/// Which manifest file currently backs which managed resource.
#[derive(Debug, Default)]
pub struct ManifestIndex {
    by_path: HashMap<PathBuf, ResourceIdentity>,
    by_identity: HashMap<ResourceIdentity, PathBuf>,
}

impl ManifestIndex {
    pub fn path_of(&self, identity: &ResourceIdentity) -> Option<&PathBuf> {
        self.by_identity.get(identity)
    }

    pub fn identity_at(&self, path: &Path) -> Option<&ResourceIdentity> {
        self.by_path.get(path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    fn insert(&mut self, path: PathBuf, identity: ResourceIdentity) {
        self.by_identity.insert(identity.clone(), path.clone());
        self.by_path.insert(path, identity);
    }

    fn remove_path(&mut self, path: &Path) -> Option<ResourceIdentity> {
        let identity = self.by_path.remove(path)?;
        if self.by_identity.get(&identity).map(PathBuf::as_path) == Some(path) {
            self.by_identity.remove(&identity);
        }
        Some(identity)
    }
}

// ---------------------------------------------------------------------------
// Source: files → repository
// ---------------------------------------------------------------------------

pub struct ManifestSource {
    dir: PathBuf,
    managed_annotation: String,
    index: Arc<Mutex<ManifestIndex>>,
    repository: Arc<Repository>,
}

impl ManifestSource {
    pub fn new(
        dir: impl Into<PathBuf>,
        managed_annotation: impl Into<String>,
        index: Arc<Mutex<ManifestIndex>>,
        repository: Arc<Repository>,
    ) -> Self {
        Self {
            dir: dir.into(),
            managed_annotation: managed_annotation.into(),
            index,
            repository,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every manifest in the directory, in file-name order.
    ///
    /// Returns the number of managed resources set. Unparseable files are
    /// logged and skipped.
    pub async fn scan(&self) -> Result<usize, DaemonError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.dir, e))?
        {
            let path = entry.path();
            if is_manifest_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut managed = 0;
        for path in paths {
            match self.file_changed(&path).await {
                Ok(true) => managed += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping manifest"),
            }
        }
        tracing::info!(managed, dir = %self.dir.display(), "initial manifest scan complete");
        Ok(managed)
    }

    /// React to a created or modified file. Returns `true` when the file is a
    /// managed, live resource that was set in the repository.
    pub async fn file_changed(&self, path: &Path) -> Result<bool, DaemonError> {
        let Some(manifest) = read_manifest(path).await? else {
            self.file_removed(path).await;
            return Ok(false);
        };
        let identity = match manifest.identity() {
            Ok(identity) => identity,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping manifest");
                self.file_removed(path).await;
                return Ok(false);
            }
        };

        let previous = self.index.lock().identity_at(path).cloned();
        if let Some(previous) = previous.filter(|prev| *prev != identity) {
            tracing::debug!(path = %path.display(), from = %previous, to = %identity, "manifest renamed");
            self.file_removed(path).await;
        }

        if !manifest.is_managed(&self.managed_annotation) {
            tracing::trace!(name = %identity, "resource not managed");
            self.file_removed(path).await;
            return Ok(false);
        }

        if manifest.is_deleted() {
            tracing::debug!(name = %identity, "resource deleted");
            self.file_removed(path).await;
            return Ok(false);
        }

        tracing::debug!(name = %identity, "resource updated");
        self.index.lock().insert(path.to_path_buf(), identity.clone());
        self.repository.set(identity, manifest.resource_data()).await;
        Ok(true)
    }

    /// React to a removed file.
    pub async fn file_removed(&self, path: &Path) {
        let identity = {
            let mut index = self.index.lock();
            let Some(identity) = index.remove_path(path) else {
                return;
            };
            if index.path_of(&identity).is_some() {
                tracing::trace!(name = %identity, "resource still backed by another manifest");
                return;
            }
            identity
        };
        match self.repository.remove(&identity).await {
            Ok(()) => tracing::debug!(name = %identity, "resource removed"),
            Err(RepositoryError::NotFound { .. }) => {
                tracing::debug!(name = %identity, "resource already absent");
            }
            Err(err) => tracing::warn!(name = %identity, error = %err, "unable to remove resource"),
        }
    }
}

// ---------------------------------------------------------------------------
// Applier: store edits → files
// ---------------------------------------------------------------------------

/// Rewrites the `data` section of the manifest backing an identity.
pub struct ManifestApplier {
    index: Arc<Mutex<ManifestIndex>>,
}

impl ManifestApplier {
    pub fn new(index: Arc<Mutex<ManifestIndex>>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl ResourceApplier for ManifestApplier {
    async fn apply(
        &self,
        identity: &ResourceIdentity,
        data: &ResourceData,
    ) -> Result<(), ApplyError> {
        let path = self
            .index
            .lock()
            .path_of(identity)
            .cloned()
            .ok_or_else(|| ApplyError::NotTracked {
                identity: identity.to_string(),
            })?;

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ApplyError::Io {
                path: path.clone(),
                source,
            })?;
        let mut manifest: Manifest =
            serde_yaml::from_str(&contents).map_err(|e| ApplyError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if manifest.identity().ok().as_ref() != Some(identity) {
            return Err(ApplyError::Rejected(format!(
                "{} now describes {}/{}",
                path.display(),
                manifest.namespace,
                manifest.name
            )));
        }

        manifest.data = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let yaml = serde_yaml::to_string(&manifest).map_err(|e| ApplyError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml)
            .await
            .map_err(|source| ApplyError::Io {
                path: tmp.clone(),
                source,
            })?;
        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ApplyError::Io { path, source });
        }

        tracing::info!(name = %identity, path = %path.display(), "manifest updated from store");
        Ok(())
    }
}
