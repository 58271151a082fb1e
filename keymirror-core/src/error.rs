//! Error types for keymirror-core.

use thiserror::Error;

use crate::types::ResourceIdentity;

/// All errors that can arise from repository operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// No cached resource exists for the identity.
    #[error("resource not found: {identity}")]
    NotFound { identity: ResourceIdentity },

    /// A namespace or name was empty, `.`, `..` or contained `/`.
    #[error("invalid resource identity '{input}': expected <namespace>/<name>")]
    InvalidIdentity { input: String },
}
