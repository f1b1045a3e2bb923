//! Correlation types for cleanup runs
//!
//! Every orchestrated run carries a `RunId` so that log events emitted across
//! many host ticks can be stitched back together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single cleanup run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Generate a new time-ordered RunId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context carried through one run for correlation
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    /// Human readable action name, e.g. `cleaning` or `wiping_<addon>`
    pub action: String,
}

impl RunContext {
    /// Create a new context with a fresh RunId
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            action: action.into(),
        }
    }

    /// Create a context with an existing RunId
    pub fn with_run_id(run_id: RunId, action: impl Into<String>) -> Self {
        Self {
            run_id,
            action: action.into(),
        }
    }
}
