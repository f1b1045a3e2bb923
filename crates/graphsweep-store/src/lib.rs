//! graphsweep Store - filesystem snapshot service
//!
//! Provides:
//! - `FsSnapshotService`, the persistence contract backed by a directory
//! - Atomic temp→rename writes on a background writer thread
//! - JSON snapshot documents with SHA-256 payload digests

pub mod atomic;
pub mod document;
pub mod errors;
pub mod service;

// Re-export key types
pub use document::SnapshotDocument;
pub use errors::{Result, StoreError};
pub use service::FsSnapshotService;
