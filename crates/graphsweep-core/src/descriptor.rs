//! Type descriptors: which members of a type hold child references
//!
//! The collector never inspects objects by itself; it asks a
//! [`TypeDescriptorProvider`] what to follow. [`DescriptorRegistry`] is the
//! stock provider, built once at startup through its builder or from a
//! serialized [`DescriptorSpec`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SweepError};
use crate::heap::{Body, Handle, Heap, Object, Shape, Value};
use crate::unlinker::RemovalFinalizer;

/// Bulk child collector for types whose references are not plain members
pub type CollectFn = fn(&Object, &mut Vec<Value>);

/// How to enumerate the children of a composite type
#[derive(Clone)]
pub enum ClassDescriptor {
    /// Follow these record fields, in order
    Members(Vec<String>),
    /// Let a function push the child values
    Collect(CollectFn),
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassDescriptor::Members(m) => f.debug_tuple("Members").field(m).finish(),
            ClassDescriptor::Collect(_) => f.write_str("Collect(..)"),
        }
    }
}

/// How to enumerate the children of a container type
#[derive(Clone)]
pub enum ContainerDescriptor {
    /// Iterate elements (lists, arrays, queues) or keys and values (maps)
    Elements,
    /// The container is opaque to the walk
    NoChildren,
    Collect(CollectFn),
}

impl fmt::Debug for ContainerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerDescriptor::Elements => f.write_str("Elements"),
            ContainerDescriptor::NoChildren => f.write_str("NoChildren"),
            ContainerDescriptor::Collect(_) => f.write_str("Collect(..)"),
        }
    }
}

/// Higher-level mutation primitives of a collection that owns a value-struct array
///
/// A ledger (roster) keeps its entries in an array of inline structs; removals
/// must go through the owner rather than through raw index edits.
pub trait LedgerOps: Send + Sync {
    /// Whether `array` holds an entry for `element` that the owner can drop
    fn can_remove_entry(&self, heap: &Heap, owner: Handle, array: Handle, element: Handle)
        -> bool;

    /// Drop every entry for `element`; returns whether anything was removed
    ///
    /// # Errors
    ///
    /// Returns an error if `array` is not a sequence of entries.
    fn remove_entry(
        &self,
        heap: &mut Heap,
        owner: Handle,
        array: Handle,
        element: Handle,
    ) -> Result<bool>;
}

/// Ledger whose entries name their element in a single struct field
#[derive(Debug, Clone)]
pub struct EntryFieldLedger {
    entry_field: String,
}

impl EntryFieldLedger {
    pub fn new(entry_field: impl Into<String>) -> Self {
        Self {
            entry_field: entry_field.into(),
        }
    }

    fn is_entry_for(&self, value: &Value, element: Handle) -> bool {
        match value {
            Value::Struct(s) => s
                .field(&self.entry_field)
                .is_some_and(|v| v.is_ref_to(element)),
            _ => false,
        }
    }
}

impl LedgerOps for EntryFieldLedger {
    fn can_remove_entry(
        &self,
        heap: &Heap,
        _owner: Handle,
        array: Handle,
        element: Handle,
    ) -> bool {
        match heap.get(array).map(|o| &o.body) {
            Ok(Body::Array(values)) | Ok(Body::List(values)) => {
                values.iter().any(|v| self.is_entry_for(v, element))
            }
            _ => false,
        }
    }

    fn remove_entry(
        &self,
        heap: &mut Heap,
        _owner: Handle,
        array: Handle,
        element: Handle,
    ) -> Result<bool> {
        let object = heap.get_mut(array)?;
        let shape = object.shape();
        match &mut object.body {
            Body::Array(values) | Body::List(values) => {
                let before = values.len();
                values.retain(|v| !self.is_entry_for(v, element));
                Ok(values.len() < before)
            }
            _ => Err(SweepError::ShapeMismatch {
                handle: array.to_string(),
                expected: "array of ledger entries".to_string(),
                actual: shape.to_string(),
            }),
        }
    }
}

/// Source of type descriptors consumed by the collector and the unlinker
///
/// Every lookup is keyed by unqualified type name. Absence is never an error:
/// callers treat an undescribed type as a leaf.
pub trait TypeDescriptorProvider {
    fn class_descriptor(&self, type_name: &str) -> Option<&ClassDescriptor>;

    /// Member names of an inline value struct that hold references
    fn struct_descriptor(&self, type_name: &str) -> Option<&[String]>;

    fn container_descriptor(&self, type_name: &str, shape: Shape) -> ContainerDescriptor;

    /// Ledger primitives of a collection owner type
    fn ledger(&self, owner_type: &str) -> Option<&dyn LedgerOps>;

    /// Type-specific finalizers run before an object of this type is detached
    fn finalizers(&self, _type_name: &str) -> Vec<&dyn RemovalFinalizer> {
        Vec::new()
    }
}

/// Static descriptor registry
#[derive(Default)]
pub struct DescriptorRegistry {
    classes: HashMap<String, ClassDescriptor>,
    structs: HashMap<String, Vec<String>>,
    opaque: HashSet<String>,
    container_collectors: HashMap<String, CollectFn>,
    ledgers: HashMap<String, Arc<dyn LedgerOps>>,
    finalizers: HashMap<String, Vec<Arc<dyn RemovalFinalizer>>>,
}

impl DescriptorRegistry {
    pub fn builder() -> DescriptorRegistryBuilder {
        DescriptorRegistryBuilder::default()
    }

    /// Build a registry from a declarative spec
    pub fn from_spec(spec: &DescriptorSpec) -> Self {
        let mut builder = Self::builder();
        for (name, members) in &spec.classes {
            builder = builder.class(name, members.iter().map(String::as_str));
        }
        for (name, members) in &spec.structs {
            builder = builder.struct_type(name, members.iter().map(String::as_str));
        }
        for name in &spec.opaque {
            builder = builder.opaque(name);
        }
        for (owner, ledger) in &spec.ledgers {
            builder = builder.ledger(owner, EntryFieldLedger::new(&ledger.entry_field));
        }
        builder.build()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("classes", &self.classes)
            .field("structs", &self.structs)
            .field("opaque", &self.opaque)
            .field("ledgers", &self.ledgers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeDescriptorProvider for DescriptorRegistry {
    fn class_descriptor(&self, type_name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(type_name)
    }

    fn struct_descriptor(&self, type_name: &str) -> Option<&[String]> {
        self.structs.get(type_name).map(Vec::as_slice)
    }

    fn container_descriptor(&self, type_name: &str, _shape: Shape) -> ContainerDescriptor {
        if self.opaque.contains(type_name) {
            return ContainerDescriptor::NoChildren;
        }
        match self.container_collectors.get(type_name) {
            Some(f) => ContainerDescriptor::Collect(*f),
            None => ContainerDescriptor::Elements,
        }
    }

    fn ledger(&self, owner_type: &str) -> Option<&dyn LedgerOps> {
        self.ledgers.get(owner_type).map(|l| l.as_ref())
    }

    fn finalizers(&self, type_name: &str) -> Vec<&dyn RemovalFinalizer> {
        self.finalizers
            .get(type_name)
            .map(|v| v.iter().map(|f| f.as_ref()).collect())
            .unwrap_or_default()
    }
}

/// Builder for [`DescriptorRegistry`]
#[derive(Default)]
pub struct DescriptorRegistryBuilder {
    inner: DescriptorRegistry,
}

impl DescriptorRegistryBuilder {
    /// Describe a composite type by its child-reference members
    pub fn class<'a>(mut self, name: &str, members: impl IntoIterator<Item = &'a str>) -> Self {
        self.inner.classes.insert(
            name.to_string(),
            ClassDescriptor::Members(members.into_iter().map(str::to_string).collect()),
        );
        self
    }

    pub fn class_collect(mut self, name: &str, collect: CollectFn) -> Self {
        self.inner
            .classes
            .insert(name.to_string(), ClassDescriptor::Collect(collect));
        self
    }

    /// Describe an inline value struct by its reference members
    pub fn struct_type<'a>(
        mut self,
        name: &str,
        members: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.inner.structs.insert(
            name.to_string(),
            members.into_iter().map(str::to_string).collect(),
        );
        self
    }

    /// Mark a container type as opaque to the walk
    pub fn opaque(mut self, name: &str) -> Self {
        self.inner.opaque.insert(name.to_string());
        self
    }

    pub fn container_collect(mut self, name: &str, collect: CollectFn) -> Self {
        self.inner
            .container_collectors
            .insert(name.to_string(), collect);
        self
    }

    pub fn ledger(mut self, owner_type: &str, ops: impl LedgerOps + 'static) -> Self {
        self.inner
            .ledgers
            .insert(owner_type.to_string(), Arc::new(ops));
        self
    }

    pub fn finalizer(mut self, type_name: &str, finalizer: impl RemovalFinalizer + 'static) -> Self {
        self.inner
            .finalizers
            .entry(type_name.to_string())
            .or_default()
            .push(Arc::new(finalizer));
        self
    }

    pub fn build(self) -> DescriptorRegistry {
        self.inner
    }
}

/// Serialized descriptor declarations
///
/// ```toml
/// opaque = ["Cache"]
///
/// [classes]
/// Hero = ["clan", "party"]
///
/// [structs]
/// TroopEntry = ["character"]
///
/// [ledgers.TroopRoster]
/// entry_field = "character"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSpec {
    #[serde(default)]
    pub classes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub structs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub opaque: Vec<String>,
    #[serde(default)]
    pub ledgers: BTreeMap<String, LedgerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSpec {
    pub entry_field: String,
}

impl DescriptorSpec {
    /// Parse a spec from JSON
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the document is malformed.
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse a spec from TOML
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the document is malformed.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }
}
