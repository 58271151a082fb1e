//! Domain types for watched resources.
//!
//! A resource is addressed by a [`ResourceIdentity`] and carries an unordered
//! [`ResourceData`] field map. The identity's `Display` form is also the key
//! used in the external store.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Globally unique `(namespace, name)` pair of a watched resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    /// Unchecked constructor; see [`ResourceIdentity::try_new`] for input
    /// that comes from outside the process.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Validating constructor. Each part must be non-empty, free of `/` and
    /// not `.` or `..`, so that distinct identities map to distinct store
    /// keys and every key parses back.
    pub fn try_new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, RepositoryError> {
        let identity = Self::new(namespace, name);
        if is_valid_segment(&identity.namespace) && is_valid_segment(&identity.name) {
            Ok(identity)
        } else {
            Err(RepositoryError::InvalidIdentity {
                input: identity.to_string(),
            })
        }
    }

    /// External-store key: `"{namespace}/{name}"`.
    pub fn store_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceIdentity {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name)) => Self::try_new(namespace, name),
            None => Err(RepositoryError::InvalidIdentity {
                input: s.to_owned(),
            }),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('/')
}

/// Field name → value mapping of a resource. Keys are unique, order is not
/// significant, and the map may be empty.
pub type ResourceData = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Kind of change emitted by the repository.
///
/// `Created` is reserved: the repository emits `Updated` for both the first
/// and every later write of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryEventType {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for RepositoryEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryEventType::Created => write!(f, "created"),
            RepositoryEventType::Updated => write!(f, "updated"),
            RepositoryEventType::Deleted => write!(f, "deleted"),
        }
    }
}

/// A change notification delivered to every repository listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEvent {
    pub event_type: RepositoryEventType,
    pub identity: ResourceIdentity,
    /// Snapshot of the resource data; `None` for deletions.
    pub data: Option<ResourceData>,
}

impl RepositoryEvent {
    pub fn updated(identity: ResourceIdentity, data: ResourceData) -> Self {
        Self {
            event_type: RepositoryEventType::Updated,
            identity,
            data: Some(data),
        }
    }

    pub fn deleted(identity: ResourceIdentity) -> Self {
        Self {
            event_type: RepositoryEventType::Deleted,
            identity,
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
