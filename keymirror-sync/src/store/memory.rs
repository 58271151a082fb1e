use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use keymirror_core::ResourceData;

use super::ExternalStore;
use crate::error::StoreError;

/// Number of calls an [`ExternalStore`] has served, by operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub get: usize,
    pub set: usize,
    pub delete: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.get + self.set + self.delete
    }
}

/// In-process store with hash-key semantics: a key exists only while it
/// holds at least one field.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ResourceData>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current fields under `key`, bypassing the call counters.
    pub fn fields(&self, key: &str) -> Option<ResourceData> {
        self.records.lock().get(key).cloned()
    }

    /// Overwrite `key` out of band, as another store client would.
    pub fn put_raw(&self, key: &str, fields: ResourceData) {
        let mut records = self.records.lock();
        if fields.is_empty() {
            records.remove(key);
        } else {
            records.insert(key.to_owned(), fields);
        }
    }

    /// Set a single field out of band.
    pub fn put_field_raw(&self, key: &str, field: &str, value: &str) {
        self.records
            .lock()
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            get: self.gets.load(Ordering::SeqCst),
            set: self.sets.load(Ordering::SeqCst),
            delete: self.deletes.load(Ordering::SeqCst),
        }
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalStore for MemoryStore {
    async fn get_all_fields(&self, key: &str) -> Result<ResourceData, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.records
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound { key: key.to_owned() })
    }

    async fn set_fields(&self, key: &str, fields: &ResourceData) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if fields.is_empty() {
            return Ok(());
        }
        let mut records = self.records.lock();
        let record = records.entry(key.to_owned()).or_default();
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            for field in fields {
                record.remove(field);
            }
            if record.is_empty() {
                records.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_key_not_found() {
        let store = MemoryStore::new();
        let err = store.get_all_fields("a/b").await.unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_set_does_not_materialize_key() {
        let store = MemoryStore::new();
        store.set_fields("a/b", &ResourceData::new()).await.unwrap();
        assert!(store.fields("a/b").is_none());
    }

    #[tokio::test]
    async fn deleting_last_field_drops_key() {
        let store = MemoryStore::new();
        store.put_field_raw("a/b", "x", "1");
        store.delete_fields("a/b", &["x".to_string()]).await.unwrap();
        assert!(store.fields("a/b").is_none());
        assert_eq!(store.calls().delete, 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_all_fields("a/b").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.set_fields("a/b", &ResourceData::new()).await.is_err());
        assert_eq!(store.calls().total(), 2);
    }
}
