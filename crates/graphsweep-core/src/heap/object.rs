use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::TypeKey;

/// Arena identity of a heap object
///
/// Two handles are the same object exactly when they are equal; object
/// contents never take part in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A slot value: primitives, references, or an inline value struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ref(Handle),
    Struct(StructValue),
}

impl Value {
    /// The referenced handle, if this is a direct reference
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Ref(h) => Some(*h),
            _ => None,
        }
    }

    pub fn is_ref_to(&self, target: Handle) -> bool {
        matches!(self, Value::Ref(h) if *h == target)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True when this value, or any field nested in it, references `target`
    pub fn mentions(&self, target: Handle) -> bool {
        match self {
            Value::Ref(h) => *h == target,
            Value::Struct(s) => s.fields.iter().any(|f| f.value.mentions(target)),
            _ => false,
        }
    }
}

/// Inline value struct; has a type but no identity of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    pub ty: TypeKey,
    pub fields: Vec<Field>,
}

impl StructValue {
    pub fn new(ty: TypeKey, fields: Vec<Field>) -> Self {
        Self { ty, fields }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// Named member slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Associative container entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

/// Object layout
///
/// `Record` is a plain composite object; every other variant is a
/// container and is walked element by element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Record(Vec<Field>),
    List(Vec<Value>),
    Map(Vec<MapEntry>),
    Array(Vec<Value>),
    Queue(VecDeque<Value>),
}

/// Discriminant of [`Body`], used for descriptor lookup and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Record,
    List,
    Map,
    Array,
    Queue,
}

impl Shape {
    pub fn is_container(self) -> bool {
        !matches!(self, Shape::Record)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Record => "record",
            Shape::List => "list",
            Shape::Map => "map",
            Shape::Array => "array",
            Shape::Queue => "queue",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Body {
    pub fn shape(&self) -> Shape {
        match self {
            Body::Record(_) => Shape::Record,
            Body::List(_) => Shape::List,
            Body::Map(_) => Shape::Map,
            Body::Array(_) => Shape::Array,
            Body::Queue(_) => Shape::Queue,
        }
    }

    /// Number of elements (fields for records, entries for maps)
    pub fn len(&self) -> usize {
        match self {
            Body::Record(fields) => fields.len(),
            Body::List(values) | Body::Array(values) => values.len(),
            Body::Map(entries) => entries.len(),
            Body::Queue(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live domain object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub ty: TypeKey,
    pub body: Body,
}

impl Object {
    pub fn new(ty: TypeKey, body: Body) -> Self {
        Self { ty, body }
    }

    pub fn shape(&self) -> Shape {
        self.body.shape()
    }

    /// Named field of a record; `None` for containers or unknown names
    pub fn field(&self, name: &str) -> Option<&Value> {
        match &self.body {
            Body::Record(fields) => fields.iter().find(|f| f.name == name).map(|f| &f.value),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match &mut self.body {
            Body::Record(fields) => fields
                .iter_mut()
                .find(|f| f.name == name)
                .map(|f| &mut f.value),
            _ => None,
        }
    }
}
