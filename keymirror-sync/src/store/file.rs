//! File store: one JSON document per store key.
//!
//! Key `namespace/name` lives at `<root>/namespace/name.json` as a flat
//! `{"field": "value"}` object. Writes go to `<path>.tmp` and are renamed
//! into place, so a reader never sees a half-written document.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use keymirror_core::{ResourceData, ResourceIdentity};

use super::ExternalStore;
use crate::error::{store_io_err, StoreError};

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<namespace>/<name>.json`. Keys that are not a valid
    /// `namespace/name` pair are refused so no document lands outside `root`.
    pub fn document_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let identity: ResourceIdentity = key
            .parse()
            .map_err(|_| StoreError::InvalidKey { key: key.to_owned() })?;
        Ok(self
            .root
            .join(&identity.namespace)
            .join(format!("{}.json", identity.name)))
    }

    async fn load(&self, key: &str) -> Result<Option<ResourceData>, StoreError> {
        let path = self.document_path(key)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(store_io_err(&path, err)),
        };
        let fields: HashMap<String, String> = serde_json::from_str(&contents)?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(fields))
    }

    async fn save(&self, key: &str, fields: &ResourceData) -> Result<(), StoreError> {
        let path = self.document_path(key)?;
        if fields.is_empty() {
            return match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(store_io_err(&path, err)),
            };
        }

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| store_io_err(dir, e))?;
        }

        let ordered: BTreeMap<&String, &String> = fields.iter().collect();
        let json = serde_json::to_string_pretty(&ordered)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| store_io_err(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(store_io_err(&path, e));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalStore for FileStore {
    async fn get_all_fields(&self, key: &str) -> Result<ResourceData, StoreError> {
        self.load(key)
            .await?
            .ok_or_else(|| StoreError::KeyNotFound { key: key.to_owned() })
    }

    async fn set_fields(&self, key: &str, fields: &ResourceData) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(key).await?.unwrap_or_default();
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        self.save(key, &record).await
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load(key).await? else {
            return Ok(());
        };
        for field in fields {
            record.remove(field);
        }
        self.save(key, &record).await
    }
}
