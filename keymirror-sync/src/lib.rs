//! # keymirror-sync
//!
//! Hash-gated, bidirectional synchronization between watched resources and
//! an external key-value store.
//!
//! Register a [`Synchronizer`] as a listener on a
//! [`Repository`](keymirror_core::Repository): every resource gets one
//! [`SyncJob`] that pushes resource data into the store and polls the store
//! for out-of-band edits, applying them back through a [`ResourceApplier`].

pub mod apply;
pub mod content_hash;
pub mod error;
pub mod job;
pub mod store;
pub mod synchronizer;

pub use apply::ResourceApplier;
pub use content_hash::{content_hash, ContentHash, SENTINEL_FIELD};
pub use error::{ApplyError, StoreError, SyncError};
pub use job::{PullOutcome, PushOutcome, SyncJob, SyncOptions, DEFAULT_POLL_INTERVAL};
pub use store::{ExternalStore, FileStore, MemoryStore, RedisStore, StoreCalls};
pub use synchronizer::Synchronizer;
