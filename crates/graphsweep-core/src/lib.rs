//! graphsweep Core - object-graph reachability and controlled removal
//!
//! This crate provides the building blocks of a cleanup run:
//! - An arena heap of handle-addressed domain objects and containers
//! - Type descriptors that say which members hold child references
//! - A breadth-first graph collector (full walk or observed from a save walk)
//! - The addon contract: removability, essential veto, dependencies, authority
//! - Ancestry escalation and the fixed-point dependency resolver
//! - Shape-specific unlinking with dry-run and apply modes
//! - Run configuration and the external snapshot-service contract

pub mod addon;
pub mod ancestry;
pub mod collector;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod heap;
pub mod logging_facility;
pub mod persistence;
pub mod resolver;
pub mod traversal;
pub mod unlinker;

pub use graphsweep_core_types as core_types;

// Re-export commonly used types
pub use addon::{Addon, AddonBuilder, AddonRegistry, NamespacePattern, SettingValues};
pub use collector::{EdgeRecorder, GraphCollector, ObjectGraph, TypeHistogram};
pub use config::{CollectionStrategy, RunConfig};
pub use descriptor::{DescriptorRegistry, TypeDescriptorProvider};
pub use errors::{ExError, ExErrorKind, Result, SweepError};
pub use heap::{Body, Field, Handle, Heap, Object, Value};
pub use persistence::{
    CompletionNotifier, MemorySnapshotService, SaveCompletion, SnapshotInfo, SnapshotService,
};
pub use resolver::{DependencyResolver, RemovalPlan, Resolution};
pub use unlinker::{RegistryFinalizer, RemovalFinalizer, UnlinkMode, Unlinker};
