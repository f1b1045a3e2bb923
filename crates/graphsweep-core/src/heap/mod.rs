//! Arena heap of domain objects
//!
//! Objects live in slots addressed by [`Handle`]. Removal never frees a slot:
//! a detached object simply stops being reachable from the root, so handles
//! recorded during a run stay valid until the run ends.

pub mod object;
pub mod types;

pub use object::{Body, Field, Handle, MapEntry, Object, Shape, StructValue, Value};
pub use types::{TypeInfo, TypeKey};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SweepError};

/// The live object graph a cleanup run operates on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heap {
    types: Vec<TypeInfo>,
    objects: Vec<Object>,
    #[serde(default)]
    root: Option<Handle>,
    /// Named-object registry; objects listed here must be unregistered on removal
    #[serde(default)]
    registry: BTreeMap<String, Handle>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the existing key if the name is already known
    pub fn intern_type(&mut self, namespace: &str, name: &str) -> TypeKey {
        if let Some(key) = self.type_key(name) {
            return key;
        }
        self.types.push(TypeInfo::new(namespace, name));
        TypeKey((self.types.len() - 1) as u32)
    }

    /// Look up a type key by its (unqualified) name
    pub fn type_key(&self, name: &str) -> Option<TypeKey> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(|i| TypeKey(i as u32))
    }

    pub fn type_info(&self, key: TypeKey) -> Option<&TypeInfo> {
        self.types.get(key.0 as usize)
    }

    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// Allocate a new object and return its handle
    pub fn alloc(&mut self, ty: TypeKey, body: Body) -> Handle {
        self.objects.push(Object::new(ty, body));
        Handle((self.objects.len() - 1) as u32)
    }

    /// Get an object by handle
    ///
    /// # Errors
    ///
    /// Returns `DanglingHandle` if the handle does not address a slot.
    pub fn get(&self, handle: Handle) -> Result<&Object> {
        self.objects
            .get(handle.index())
            .ok_or_else(|| SweepError::DanglingHandle {
                handle: handle.to_string(),
            })
    }

    /// Get a mutable object by handle
    ///
    /// # Errors
    ///
    /// Returns `DanglingHandle` if the handle does not address a slot.
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Object> {
        self.objects
            .get_mut(handle.index())
            .ok_or_else(|| SweepError::DanglingHandle {
                handle: handle.to_string(),
            })
    }

    pub fn contains(&self, handle: Handle) -> bool {
        handle.index() < self.objects.len()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn set_root(&mut self, handle: Handle) {
        self.root = Some(handle);
    }

    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Type info of the object at `handle`
    pub fn type_of(&self, handle: Handle) -> Option<&TypeInfo> {
        self.objects
            .get(handle.index())
            .and_then(|o| self.type_info(o.ty))
    }

    pub fn type_name(&self, handle: Handle) -> Option<&str> {
        self.type_of(handle).map(|t| t.name.as_str())
    }

    pub fn namespace_of(&self, handle: Handle) -> Option<&str> {
        self.type_of(handle).map(|t| t.namespace.as_str())
    }

    /// Overwrite a named field of a record
    ///
    /// # Errors
    ///
    /// Returns `DanglingHandle` for an unknown handle, or `ShapeMismatch` if
    /// the object is not a record or has no field with that name.
    pub fn set_field(&mut self, handle: Handle, name: &str, value: Value) -> Result<()> {
        let object = self.get_mut(handle)?;
        let shape = object.shape();
        match object.field_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SweepError::ShapeMismatch {
                handle: handle.to_string(),
                expected: format!("record with field '{}'", name),
                actual: shape.to_string(),
            }),
        }
    }

    /// Register an object under a global name
    pub fn register_named(&mut self, name: impl Into<String>, handle: Handle) {
        self.registry.insert(name.into(), handle);
    }

    pub fn lookup_named(&self, name: &str) -> Option<Handle> {
        self.registry.get(name).copied()
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.registry.values().any(|h| *h == handle)
    }

    /// Remove every registry name bound to `handle`, returning the names
    pub fn unregister(&mut self, handle: Handle) -> Vec<String> {
        let names: Vec<String> = self
            .registry
            .iter()
            .filter(|(_, h)| **h == handle)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.registry.remove(name);
        }
        names
    }

    pub fn registry(&self) -> &BTreeMap<String, Handle> {
        &self.registry
    }
}
