//! Shape-specific detachment of an object from one parent
//!
//! Every strategy has a dry-run that reports feasibility without touching
//! the heap and an apply that mutates. Runs are single-threaded, so a
//! successful dry-run guarantees the apply succeeds.

use std::fmt;

use crate::collector::ObjectGraph;
use crate::descriptor::TypeDescriptorProvider;
use crate::errors::{Result, SweepError};
use crate::heap::{Body, Handle, Heap, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkMode {
    DryRun,
    Apply,
}

/// How a child is detached from a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkStrategy {
    /// Remove matching elements from a list or queue
    Sequential,
    /// Remove the map entry keyed by the child
    Keyed,
    /// Null the record fields that reference the child
    FieldNull,
    /// Ask the array's owning collection to drop the child's entry
    Ledger { owner: Handle },
}

impl fmt::Display for UnlinkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlinkStrategy::Sequential => f.write_str("sequential"),
            UnlinkStrategy::Keyed => f.write_str("keyed"),
            UnlinkStrategy::FieldNull => f.write_str("field_null"),
            UnlinkStrategy::Ledger { owner } => write!(f, "ledger({})", owner),
        }
    }
}

/// External deregistration run once per removed object, before it is detached
pub trait RemovalFinalizer: Send + Sync {
    fn name(&self) -> &str;

    fn applies_to(&self, _heap: &Heap, _object: Handle) -> bool {
        true
    }

    /// # Errors
    ///
    /// Returns an error if the object cannot be finalized; this aborts the run.
    fn finalize(&self, heap: &mut Heap, object: Handle) -> Result<()>;
}

/// Drops removed objects from the heap's named-object registry
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryFinalizer;

impl RemovalFinalizer for RegistryFinalizer {
    fn name(&self) -> &str {
        "registry"
    }

    fn applies_to(&self, heap: &Heap, object: Handle) -> bool {
        heap.is_registered(object)
    }

    fn finalize(&self, heap: &mut Heap, object: Handle) -> Result<()> {
        let names = heap.unregister(object);
        tracing::debug!(object = %object, names = ?names, "Unregistered removed object");
        Ok(())
    }
}

/// The built-in removal handler
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlinker;

impl Unlinker {
    /// Detach `child` from `parent` in the given mode
    ///
    /// Returns the strategy used, or `None` when no strategy applies.
    ///
    /// # Errors
    ///
    /// Returns `DanglingHandle` for unknown handles, or an error from a
    /// ledger's `remove_entry`.
    pub fn unlink(
        heap: &mut Heap,
        graph: &ObjectGraph,
        provider: &dyn TypeDescriptorProvider,
        child: Handle,
        parent: Handle,
        mode: UnlinkMode,
    ) -> Result<Option<UnlinkStrategy>> {
        match mode {
            UnlinkMode::DryRun => Self::dry_run(heap, graph, provider, child, parent),
            UnlinkMode::Apply => Self::apply(heap, graph, provider, child, parent),
        }
    }

    /// Report which strategy would detach `child` from `parent`
    ///
    /// # Errors
    ///
    /// Returns `DanglingHandle` if `parent` is not a heap object.
    pub fn dry_run(
        heap: &Heap,
        graph: &ObjectGraph,
        provider: &dyn TypeDescriptorProvider,
        child: Handle,
        parent: Handle,
    ) -> Result<Option<UnlinkStrategy>> {
        let object = heap.get(parent)?;
        let strategy = match &object.body {
            Body::Record(fields) => fields
                .iter()
                .any(|f| f.value.mentions(child))
                .then_some(UnlinkStrategy::FieldNull),
            Body::List(values) => {
                if values.iter().any(|v| v.is_ref_to(child)) {
                    Some(UnlinkStrategy::Sequential)
                } else {
                    Self::find_ledger(heap, graph, provider, child, parent)
                }
            }
            Body::Queue(values) => values
                .iter()
                .any(|v| v.is_ref_to(child))
                .then_some(UnlinkStrategy::Sequential),
            Body::Map(entries) => entries
                .iter()
                .any(|e| e.key.is_ref_to(child))
                .then_some(UnlinkStrategy::Keyed),
            Body::Array(_) => Self::find_ledger(heap, graph, provider, child, parent),
        };
        Ok(strategy)
    }

    /// Detach `child` from `parent`, returning the strategy that did it
    ///
    /// # Errors
    ///
    /// Returns `DanglingHandle` for unknown handles, or a ledger error.
    pub fn apply(
        heap: &mut Heap,
        graph: &ObjectGraph,
        provider: &dyn TypeDescriptorProvider,
        child: Handle,
        parent: Handle,
    ) -> Result<Option<UnlinkStrategy>> {
        let Some(strategy) = Self::dry_run(heap, graph, provider, child, parent)? else {
            return Ok(None);
        };

        if let UnlinkStrategy::Ledger { owner } = strategy {
            let type_name = heap.type_name(owner).unwrap_or_default().to_string();
            let ledger = provider
                .ledger(&type_name)
                .ok_or_else(|| SweepError::Internal {
                    message: format!("ledger for {} disappeared", type_name),
                })?;
            let removed = ledger.remove_entry(heap, owner, parent, child)?;
            return Ok(removed.then_some(strategy));
        }

        let object = heap.get_mut(parent)?;
        match &mut object.body {
            Body::Record(fields) => {
                for field in fields.iter_mut() {
                    null_references(&mut field.value, child);
                }
            }
            Body::List(values) => values.retain(|v| !v.is_ref_to(child)),
            Body::Queue(values) => values.retain(|v| !v.is_ref_to(child)),
            Body::Map(entries) => entries.retain(|e| !e.key.is_ref_to(child)),
            Body::Array(_) => return Ok(None),
        }
        Ok(Some(strategy))
    }

    /// First owner of `array` whose ledger can drop an entry for `child`
    fn find_ledger(
        heap: &Heap,
        graph: &ObjectGraph,
        provider: &dyn TypeDescriptorProvider,
        child: Handle,
        array: Handle,
    ) -> Option<UnlinkStrategy> {
        graph.parents(array).iter().find_map(|&owner| {
            let type_name = heap.type_name(owner)?;
            let ledger = provider.ledger(type_name)?;
            ledger
                .can_remove_entry(heap, owner, array, child)
                .then_some(UnlinkStrategy::Ledger { owner })
        })
    }
}

fn null_references(value: &mut Value, child: Handle) {
    if value.is_ref_to(child) {
        *value = Value::Null;
    } else if let Value::Struct(s) = value {
        for field in &mut s.fields {
            null_references(&mut field.value, child);
        }
    }
}
