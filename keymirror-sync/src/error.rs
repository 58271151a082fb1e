//! Error types for keymirror-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by an [`ExternalStore`](crate::store::ExternalStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key holds no fields. Callers treat this as an empty field set.
    #[error("store key not found: {key}")]
    KeyNotFound { key: String },

    /// The key is not a valid `namespace/name` pair.
    #[error("invalid store key: {key}")]
    InvalidKey { key: String },

    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A Redis command or connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored document could not be encoded or decoded.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by a [`ResourceApplier`](crate::apply::ResourceApplier)
/// while writing data back to the authoritative resource.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The applier has no resource on record for the identity.
    #[error("no authoritative resource tracked for {identity}")]
    NotTracked { identity: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The resource document could not be encoded or decoded.
    #[error("malformed resource at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The resource owner rejected the update.
    #[error("update rejected: {0}")]
    Rejected(String),
}

/// All errors that can arise from a push or pull.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
