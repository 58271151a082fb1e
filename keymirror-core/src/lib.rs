//! keymirror core library: resource identities, the in-memory repository
//! and the change events it fans out to listeners.
//!
//! - [`types`]: identities, resource data and repository events
//! - [`error`]: [`RepositoryError`]
//! - [`repository`]: [`Repository`] cache with synchronous listener fan-out

pub mod error;
pub mod repository;
pub mod types;

pub use error::RepositoryError;
pub use repository::{Repository, RepositoryListener};
pub use types::{RepositoryEvent, RepositoryEventType, ResourceData, ResourceIdentity};
