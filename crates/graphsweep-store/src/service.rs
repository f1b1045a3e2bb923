//! Filesystem snapshot service
//!
//! `save_as` walks the heap on the calling thread (so observers see the
//! graph exactly as it was when the save was requested), encodes the
//! document, and hands the bytes to a writer thread. The writer writes
//! `<dir>/<name>.json` atomically and then signals completion.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use graphsweep_core::descriptor::TypeDescriptorProvider;
use graphsweep_core::errors::SweepError;
use graphsweep_core::persistence::{
    save_walk, CompletionNotifier, SnapshotInfo, SnapshotService,
};
use graphsweep_core::traversal::TraversalVisitor;
use graphsweep_core::{log_op_end, log_op_error, log_op_start, Heap};

use crate::atomic::atomic_write;
use crate::document::SnapshotDocument;
use crate::errors::{io_error, sweep_io, Result, StoreError};

const EXTENSION: &str = "json";

struct PendingWrite {
    name: String,
    handle: JoinHandle<()>,
}

/// Snapshot service storing one JSON document per snapshot in a directory
pub struct FsSnapshotService {
    dir: PathBuf,
    writers: Vec<PendingWrite>,
}

impl FsSnapshotService {
    /// Create a service rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    /// Load the document stored under `name`
    pub fn read_document(&self, name: &str) -> Result<SnapshotDocument> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Missing {
                    name: name.to_string(),
                }
                .into())
            }
            Err(e) => return Err(io_error("read_snapshot", e)),
        };
        SnapshotDocument::from_bytes(name, &bytes)
    }

    /// Load the heap stored under `name`
    pub fn read_snapshot(&self, name: &str) -> Result<Heap> {
        Ok(self.read_document(name)?.heap)
    }

    /// Names of stored snapshots, sorted
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("list_snapshots", e)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Block until every writer thread has finished
    pub fn wait_idle(&mut self) {
        for pending in self.writers.drain(..) {
            if pending.handle.join().is_err() {
                tracing::error!(snapshot = %pending.name, "Snapshot writer panicked");
            }
        }
    }

    fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.writers)
            .into_iter()
            .partition(|w| w.handle.is_finished());
        self.writers = running;
        for pending in finished {
            if pending.handle.join().is_err() {
                tracing::error!(snapshot = %pending.name, "Snapshot writer panicked");
            }
        }
    }
}

impl SnapshotService for FsSnapshotService {
    fn is_saving(&self) -> bool {
        self.writers.iter().any(|w| !w.handle.is_finished())
    }

    fn save_as(
        &mut self,
        name: &str,
        heap: &Heap,
        provider: &dyn TypeDescriptorProvider,
        observer: Option<&mut dyn TraversalVisitor>,
        notifier: CompletionNotifier,
    ) -> graphsweep_core::Result<()> {
        self.reap_finished();
        let start = Instant::now();
        log_op_start!("save_as", snapshot = name);

        let reachable_count = save_walk(heap, provider, observer)?;
        let bytes = match SnapshotDocument::new(name, heap.clone(), reachable_count)
            .and_then(|document| document.to_bytes())
        {
            Ok(bytes) => bytes,
            Err(err) => {
                log_op_error!("save_as", err, duration_ms = start.elapsed().as_millis() as u64);
                notifier.notify(name, false);
                return Ok(());
            }
        };

        let path = self.path_for(name);
        let snapshot = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("snapshot-{}", name))
            .spawn(move || {
                let started = Instant::now();
                match atomic_write(&path, &bytes) {
                    Ok(()) => {
                        log_op_end!(
                            "write_snapshot",
                            duration_ms = started.elapsed().as_millis() as u64,
                            snapshot = snapshot.as_str(),
                            size_bytes = bytes.len()
                        );
                        notifier.notify(&snapshot, true);
                    }
                    Err(err) => {
                        log_op_error!(
                            "write_snapshot",
                            err.with_snapshot(snapshot.as_str()),
                            duration_ms = started.elapsed().as_millis() as u64
                        );
                        notifier.notify(&snapshot, false);
                    }
                }
            })
            .map_err(|e| sweep_io("spawn_snapshot_writer", e))?;

        self.writers.push(PendingWrite {
            name: name.to_string(),
            handle,
        });
        log_op_end!(
            "save_as",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshot = name,
            reachable_count = reachable_count
        );
        Ok(())
    }

    fn get_save_with_name(&self, name: &str) -> Option<SnapshotInfo> {
        let writing = self.writers.iter().any(|w| w.name == name);
        if !writing && !self.path_for(name).exists() {
            return None;
        }
        match self.read_document(name) {
            Ok(document) => Some(SnapshotInfo {
                name: document.name,
                object_count: document.heap.len(),
                reachable_count: document.reachable_count,
                digest: Some(document.digest),
            }),
            Err(err) => {
                // The name stays taken so a new save never overwrites it
                if !writing {
                    tracing::warn!(snapshot = name, error = %err, "Unreadable snapshot");
                }
                Some(SnapshotInfo {
                    name: name.to_string(),
                    object_count: 0,
                    reachable_count: 0,
                    digest: None,
                })
            }
        }
    }

    fn delete_save(&mut self, name: &str) -> graphsweep_core::Result<bool> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => {
                tracing::info!(snapshot = name, "Deleted snapshot");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SweepError::Io {
                op: format!("delete snapshot {}", name),
                message: e.to_string(),
            }),
        }
    }
}

impl Drop for FsSnapshotService {
    fn drop(&mut self) {
        self.wait_idle();
    }
}
