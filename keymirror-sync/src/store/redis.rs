//! Redis store: every key is a Redis hash, every field a hash field.
//!
//! Reads use `HGETALL`, upserts `HSET` and removals `HDEL`. Redis drops a
//! hash once its last field is deleted, so an empty `HGETALL` reply is
//! reported as [`StoreError::KeyNotFound`].

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use keymirror_core::ResourceData;

use super::ExternalStore;
use crate::error::StoreError;

/// [`ExternalStore`] over one multiplexed Redis connection.
///
/// Commands from every job share the connection; cloning it is cheap.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `url` (`redis://[:password@]host[:port][/db]`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        tracing::info!(addr = %client.get_connection_info().addr, "connected to redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl ExternalStore for RedisStore {
    async fn get_all_fields(&self, key: &str) -> Result<ResourceData, StoreError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        if fields.is_empty() {
            return Err(StoreError::KeyNotFound { key: key.to_owned() });
        }
        Ok(fields)
    }

    async fn set_fields(&self, key: &str, fields: &ResourceData) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
            .collect();
        let mut conn = self.connection.clone();
        conn.hset_multiple::<_, _, _, ()>(key, &items).await?;
        Ok(())
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        conn.hdel::<_, _, ()>(key, fields.to_vec()).await?;
        Ok(())
    }
}
