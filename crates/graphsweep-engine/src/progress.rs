//! Progress reporting seam
//!
//! The orchestrator never talks to a UI directly. Hosts hand it a
//! [`ProgressSink`]; tests use [`RecordingProgress`] to look at what a user
//! would have seen.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Receives user-facing run progress
pub trait ProgressSink: Send {
    /// Shown while a run is in flight, hidden when it ends
    fn set_active(&mut self, active: bool);

    /// Replace the one-line status of the run
    fn set_status(&mut self, status: &str);

    fn message(&mut self, level: MessageLevel, text: &str);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn set_active(&mut self, _active: bool) {}

    fn set_status(&mut self, _status: &str) {}

    fn message(&mut self, _level: MessageLevel, _text: &str) {}
}

/// One call received by a [`RecordingProgress`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Active { active: bool },
    Status { status: String },
    Message { level: MessageLevel, text: String },
}

/// Records every call; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Message texts at `level`, in order
    pub fn messages(&self, level: MessageLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Message { level: l, text } if l == level => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Status { status } => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Whether the last visibility call turned the indicator on
    pub fn is_active(&self) -> bool {
        self.events()
            .iter()
            .rev()
            .find_map(|e| match e {
                ProgressEvent::Active { active } => Some(*active),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn push(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ProgressSink for RecordingProgress {
    fn set_active(&mut self, active: bool) {
        self.push(ProgressEvent::Active { active });
    }

    fn set_status(&mut self, status: &str) {
        self.push(ProgressEvent::Status {
            status: status.to_string(),
        });
    }

    fn message(&mut self, level: MessageLevel, text: &str) {
        self.push(ProgressEvent::Message {
            level,
            text: text.to_string(),
        });
    }
}
