//! Content hash: SHA-256 fingerprint of a resource's field set.
//!
//! Used only in memory to suppress redundant reconciliation. The digest is
//! taken over a canonical form: the sentinel field is dropped, the remaining
//! fields are ordered by key and serialized as compact JSON. Field order in
//! the input map never affects the result.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use keymirror_core::ResourceData;

/// Reserved field written for resources with no data so the store key exists.
pub const SENTINEL_FIELD: &str = "_empty";

/// Hex-encoded SHA-256 digest of canonicalized resource data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Canonical byte form of `data`, sentinel excluded.
pub fn canonicalize(data: &ResourceData) -> Vec<u8> {
    let ordered: BTreeMap<&str, &str> = data
        .iter()
        .filter(|(k, _)| k.as_str() != SENTINEL_FIELD)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    // A map of string keys to string values always serializes.
    serde_json::to_vec(&ordered).unwrap_or_default()
}

/// Fingerprint of `data`.
pub fn content_hash(data: &ResourceData) -> ContentHash {
    let mut h = Sha256::new();
    h.update(canonicalize(data));
    ContentHash(hex::encode(h.finalize()))
}
