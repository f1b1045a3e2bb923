//! Persistence service contract
//!
//! The engine never writes snapshots itself. It asks a [`SnapshotService`]
//! to save the heap under a name and waits for a [`SaveCompletion`] on the
//! channel behind the [`CompletionNotifier`] it handed over. The save walk
//! can feed a [`TraversalVisitor`], which is how the inline collection
//! strategy gets its edges for free.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};

use crate::descriptor::TypeDescriptorProvider;
use crate::errors::Result;
use crate::heap::{Handle, Heap};
use crate::traversal::{self, TeeVisitor, TraversalVisitor};

/// Completion signal of one `save_as` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveCompletion {
    pub name: String,
    pub success: bool,
}

/// Sending half of the completion channel
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    sender: Sender<SaveCompletion>,
}

impl CompletionNotifier {
    pub fn channel() -> (Self, Receiver<SaveCompletion>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    /// Deliver a completion; a dropped receiver is logged and ignored
    pub fn notify(&self, name: &str, success: bool) {
        let completion = SaveCompletion {
            name: name.to_string(),
            success,
        };
        if self.sender.send(completion).is_err() {
            tracing::warn!(snapshot = name, "Save completion has no receiver");
        }
    }
}

/// What a service knows about a stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub object_count: usize,
    /// Objects reached by the save walk, containers included
    pub reachable_count: usize,
    pub digest: Option<String>,
}

/// External save service
pub trait SnapshotService {
    /// True while a previously requested save has not completed
    fn is_saving(&self) -> bool;

    /// Request a snapshot of `heap` under `name`
    ///
    /// The reachable graph is walked before this returns, feeding
    /// `observer` when given. Completion arrives later through `notifier`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot even be started; failures
    /// after that are reported as an unsuccessful completion.
    fn save_as(
        &mut self,
        name: &str,
        heap: &Heap,
        provider: &dyn TypeDescriptorProvider,
        observer: Option<&mut dyn TraversalVisitor>,
        notifier: CompletionNotifier,
    ) -> Result<()>;

    fn get_save_with_name(&self, name: &str) -> Option<SnapshotInfo>;

    /// Delete a snapshot; `Ok(false)` when there was none
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot could not be deleted.
    fn delete_save(&mut self, name: &str) -> Result<bool>;
}

/// Counts objects reached by a save walk
#[derive(Debug, Default)]
pub struct ReachCounter {
    count: usize,
}

impl ReachCounter {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl TraversalVisitor for ReachCounter {
    fn on_object(&mut self, _handle: Handle, _is_container: bool) {
        self.count += 1;
    }

    fn on_edge(&mut self, _child: Handle, _parent: Handle) {}
}

/// Run the save walk, feeding the optional observer; returns the reachable count
///
/// # Errors
///
/// Propagates walk errors (missing root, dangling handles).
pub fn save_walk(
    heap: &Heap,
    provider: &dyn TypeDescriptorProvider,
    observer: Option<&mut dyn TraversalVisitor>,
) -> Result<usize> {
    let mut counter = ReachCounter::default();
    match observer {
        Some(observer) => {
            let mut tee = TeeVisitor::new(observer, &mut counter);
            traversal::walk(heap, provider, &mut tee)?;
        }
        None => traversal::walk(heap, provider, &mut counter)?,
    }
    Ok(counter.count())
}

#[derive(Debug)]
struct StoredSnapshot {
    heap: Heap,
    reachable_count: usize,
}

/// In-memory snapshot service
///
/// Completions are delivered immediately unless held; held completions are
/// delivered by [`MemorySnapshotService::release_pending`]. Saves whose name
/// starts with a registered failure prefix complete unsuccessfully.
#[derive(Debug, Default)]
pub struct MemorySnapshotService {
    saves: BTreeMap<String, StoredSnapshot>,
    hold: bool,
    pending: Vec<(CompletionNotifier, SaveCompletion)>,
    fail_prefixes: Vec<String>,
    requested: Vec<String>,
    deleted: Vec<String>,
}

impl MemorySnapshotService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold completions until released
    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    pub fn set_hold(&mut self, hold: bool) {
        self.hold = hold;
    }

    /// Make every later save whose name starts with `prefix` fail
    pub fn fail_prefix(&mut self, prefix: &str) {
        self.fail_prefixes.push(prefix.to_string());
    }

    /// Deliver held completions; returns how many were delivered
    pub fn release_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (notifier, completion) in pending {
            notifier.notify(&completion.name, completion.success);
        }
        count
    }

    /// Names passed to `save_as`, in request order
    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    /// Names of snapshots currently stored
    pub fn names(&self) -> Vec<&str> {
        self.saves.keys().map(String::as_str).collect()
    }

    /// The heap as it was saved under `name`
    pub fn saved_heap(&self, name: &str) -> Option<&Heap> {
        self.saves.get(name).map(|s| &s.heap)
    }
}

impl SnapshotService for MemorySnapshotService {
    fn is_saving(&self) -> bool {
        !self.pending.is_empty()
    }

    fn save_as(
        &mut self,
        name: &str,
        heap: &Heap,
        provider: &dyn TypeDescriptorProvider,
        observer: Option<&mut dyn TraversalVisitor>,
        notifier: CompletionNotifier,
    ) -> Result<()> {
        self.requested.push(name.to_string());

        let success = if self.fail_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            tracing::debug!(snapshot = name, "Save forced to fail");
            false
        } else {
            let reachable_count = save_walk(heap, provider, observer)?;
            self.saves.insert(
                name.to_string(),
                StoredSnapshot {
                    heap: heap.clone(),
                    reachable_count,
                },
            );
            true
        };

        let completion = SaveCompletion {
            name: name.to_string(),
            success,
        };
        if self.hold {
            self.pending.push((notifier, completion));
        } else {
            notifier.notify(&completion.name, completion.success);
        }
        Ok(())
    }

    fn get_save_with_name(&self, name: &str) -> Option<SnapshotInfo> {
        self.saves.get(name).map(|s| SnapshotInfo {
            name: name.to_string(),
            object_count: s.heap.len(),
            reachable_count: s.reachable_count,
            digest: None,
        })
    }

    fn delete_save(&mut self, name: &str) -> Result<bool> {
        let existed = self.saves.remove(name).is_some();
        if existed {
            self.deleted.push(name.to_string());
        }
        Ok(existed)
    }
}
