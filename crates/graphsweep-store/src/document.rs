//! On-disk snapshot document
//!
//! A snapshot is one JSON file: a small header followed by the heap's type
//! table, objects, root and named-object registry at the top level.

use chrono::{DateTime, Utc};
use graphsweep_core::Heap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{serialization_error, Result, StoreError};

/// Current document format
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub format_version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the serialized heap payload (hex)
    pub digest: String,
    /// Objects reached by the save walk
    pub reachable_count: usize,
    #[serde(flatten)]
    pub heap: Heap,
}

impl SnapshotDocument {
    /// Build a document stamped with the current time
    pub fn new(name: &str, heap: Heap, reachable_count: usize) -> Result<Self> {
        let digest = payload_digest(&heap)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            name: name.to_string(),
            created_at: Utc::now(),
            digest,
            reachable_count,
            heap,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| serialization_error("encode_snapshot", e))
    }

    /// Parse a document, rejecting unknown format versions
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let document: SnapshotDocument =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        if document.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat {
                name: name.to_string(),
                found: document.format_version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        Ok(document)
    }
}

/// SHA-256 digest of a heap's canonical JSON encoding
pub fn payload_digest(heap: &Heap) -> Result<String> {
    let payload = serde_json::to_vec(heap).map_err(|e| serialization_error("digest_heap", e))?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}
