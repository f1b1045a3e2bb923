//! Run report
//!
//! Assembled once when a run reaches `Complete`, whichever way it got there.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use graphsweep_core::core_types::RunId;
use graphsweep_core::Handle;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Removal ran to the end
    Cleaned,
    /// Nothing was removable; the heap was never touched
    NothingToClean,
    /// The run stopped early; restore the backup if one exists
    Failed { reason: String },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// A removal held back because nobody had authority over the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockedRemoval {
    pub object: Handle,
    /// Highest ancestor the authority search reached
    pub ancestor: Handle,
}

/// Snapshot names taken by the run; only successful saves are listed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSnapshots {
    pub backup: Option<String>,
    pub temporary: Option<String>,
    pub finish: Option<String>,
    /// Snapshots deleted again before the run ended
    pub deleted: Vec<String>,
}

impl RunSnapshots {
    /// Snapshots that still exist after the run
    pub fn kept(&self) -> Vec<&str> {
        [&self.backup, &self.temporary, &self.finish]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|name| !self.deleted.iter().any(|d| d == name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// `cleaning` or `wiping_<addon>`
    pub action: String,
    pub outcome: RunOutcome,
    pub removed: usize,
    /// Removed objects per owning addon id
    pub by_addon: BTreeMap<String, usize>,
    /// Per-type reachable count before minus after
    pub delta: BTreeMap<String, i64>,
    pub blocked: Vec<BlockedRemoval>,
    pub snapshots: RunSnapshots,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Sum of the histogram delta over all types
    pub fn delta_total(&self) -> i64 {
        self.delta.values().sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RunOutcome::Cleaned => writeln!(f, "Cleaned {} objects", self.removed)?,
            RunOutcome::NothingToClean => writeln!(f, "Nothing to clean")?,
            RunOutcome::Failed { reason } => writeln!(f, "Clean terminated: {}", reason)?,
        }
        for (addon, count) in &self.by_addon {
            writeln!(f, "  {}: {}", addon, count)?;
        }
        for (type_name, delta) in self.delta.iter().filter(|(_, d)| **d != 0) {
            writeln!(f, "  {} {:+}", type_name, -delta)?;
        }
        if !self.blocked.is_empty() {
            writeln!(f, "  {} removals blocked", self.blocked.len())?;
        }
        for name in self.snapshots.kept() {
            writeln!(f, "  snapshot {}", name)?;
        }
        write!(
            f,
            "Took {:.2} seconds",
            self.elapsed_ms as f64 / 1000.0
        )
    }
}
