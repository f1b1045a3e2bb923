use serde::{Deserialize, Serialize};

/// Index into the heap's interned type table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(pub u32);

/// Declared identity of a domain type
///
/// The namespace is what authority routing matches against; the name is
/// what descriptors and histograms are keyed by. Names are unique per heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub namespace: String,
}

impl TypeInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Namespace-qualified name, e.g. `World.Characters.Hero`
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}
