//! Write-back seam to the authoritative resource owner.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use keymirror_core::{ResourceData, ResourceIdentity};

use crate::error::ApplyError;

/// Persists data detected in the external store back onto the resource.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    async fn apply(&self, identity: &ResourceIdentity, data: &ResourceData)
        -> Result<(), ApplyError>;
}
