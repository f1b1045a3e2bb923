//! Error handling for graphsweep-store
//!
//! Wraps graphsweep-core ExError with store-specific helpers

use graphsweep_core::errors::{ExError, ExErrorKind, SweepError};
use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Snapshot document failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Snapshot {name} not found")]
    Missing { name: String },

    #[error("Snapshot {name} has format version {found}, expected {expected}")]
    UnsupportedFormat {
        name: String,
        found: u32,
        expected: u32,
    },

    #[error("Snapshot {name} is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
}

impl From<StoreError> for ExError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::Missing { name } => ExError::new(ExErrorKind::NotFound)
                .with_op("read_snapshot")
                .with_snapshot(name)
                .with_message(message),
            StoreError::UnsupportedFormat { name, .. } | StoreError::Corrupt { name, .. } => {
                ExError::new(ExErrorKind::Persistence)
                    .with_op("read_snapshot")
                    .with_snapshot(name)
                    .with_message(message)
            }
        }
    }
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create a serialization error
pub fn serialization_error(operation: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// IO failure as the domain error the snapshot-service contract speaks
pub fn sweep_io(operation: &str, err: std::io::Error) -> SweepError {
    SweepError::Io {
        op: operation.to_string(),
        message: err.to_string(),
    }
}
