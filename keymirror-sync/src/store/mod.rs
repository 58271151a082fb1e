//! External key-value store seam.
//!
//! A store addresses hash-like records by key (`namespace/name`) and exposes
//! field-level reads and writes. Implementations:
//!
//! - [`MemoryStore`]: in-process, with call counters and a failure switch
//! - [`FileStore`]: one JSON document per key under a root directory
//! - [`RedisStore`]: one Redis hash per key

mod file;
mod memory;
mod redis;

use async_trait::async_trait;

use keymirror_core::ResourceData;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::{MemoryStore, StoreCalls};
pub use self::redis::RedisStore;

#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// Every field stored under `key`.
    ///
    /// Fails with [`StoreError::KeyNotFound`] when the key holds no fields.
    async fn get_all_fields(&self, key: &str) -> Result<ResourceData, StoreError>;

    /// Upsert `fields` under `key`. Fields not named are left untouched.
    async fn set_fields(&self, key: &str, fields: &ResourceData) -> Result<(), StoreError>;

    /// Remove exactly the named `fields` from `key`. Removing the last field
    /// removes the key.
    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError>;
}

/// [`ExternalStore::get_all_fields`] with a missing key mapped to an empty set.
pub async fn read_fields(
    store: &dyn ExternalStore,
    key: &str,
) -> Result<ResourceData, StoreError> {
    match store.get_all_fields(key).await {
        Ok(fields) => Ok(fields),
        Err(StoreError::KeyNotFound { .. }) => Ok(ResourceData::new()),
        Err(err) => Err(err),
    }
}
