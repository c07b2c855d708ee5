//! # Property Definitions
//!
//! A model type is described by an ordered list of [`PropertyDescriptor`]s
//! held in a [`PropertyManager`]. Descriptors are built once when the model
//! type is registered and shared read-only by every instance.

use crate::error::PortalError;
use crate::schema::ModelSchema;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Type tag of a property value.
#[derive(Clone)]
pub enum ValueType {
    Boolean,
    Integer,
    Decimal,
    Text,
    /// RFC 3339 timestamp stored as a string.
    DateTime,
    /// Any JSON value.
    Json,
    /// A single child model.
    Child(Arc<ModelSchema>),
    /// A collection of child models. `fetch_method` names the DAO method that
    /// loads the collection by parent key when the parent DTO does not carry it.
    ChildCollection {
        schema: Arc<ModelSchema>,
        fetch_method: Option<String>,
    },
}

impl ValueType {
    pub fn is_child(&self) -> bool {
        matches!(self, ValueType::Child(_) | ValueType::ChildCollection { .. })
    }

    /// Checks a scalar value against this type. `null` is always accepted.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::Boolean, Value::Bool(_)) => true,
            (ValueType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ValueType::Decimal, Value::Number(_)) => true,
            (ValueType::Text, Value::String(_)) => true,
            (ValueType::DateTime, Value::String(_)) => true,
            (ValueType::Json, _) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => f.write_str("Boolean"),
            ValueType::Integer => f.write_str("Integer"),
            ValueType::Decimal => f.write_str("Decimal"),
            ValueType::Text => f.write_str("Text"),
            ValueType::DateTime => f.write_str("DateTime"),
            ValueType::Json => f.write_str("Json"),
            ValueType::Child(schema) => write!(f, "Child({})", schema.name()),
            ValueType::ChildCollection { schema, .. } => {
                write!(f, "ChildCollection({})", schema.name())
            }
        }
    }
}

/// Boolean facets of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    pub key: bool,
    pub parent_key: bool,
    pub read_only: bool,
    pub on_wire_in: bool,
    pub on_wire_out: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            key: false,
            parent_key: false,
            read_only: false,
            on_wire_in: true,
            on_wire_out: true,
        }
    }
}

/// Identifies one field of a model type.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    value_type: ValueType,
    flags: PropertyFlags,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            flags: PropertyFlags::default(),
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Boolean)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Integer)
    }

    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Decimal)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Text)
    }

    pub fn date_time(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::DateTime)
    }

    pub fn child(name: impl Into<String>, schema: Arc<ModelSchema>) -> Self {
        Self::new(name, ValueType::Child(schema))
    }

    pub fn children(name: impl Into<String>, schema: Arc<ModelSchema>) -> Self {
        Self::new(
            name,
            ValueType::ChildCollection {
                schema,
                fetch_method: None,
            },
        )
    }

    /// A child collection loaded through a relationship fetcher such as
    /// `fetchForOrder`.
    pub fn children_fetched_by(
        name: impl Into<String>,
        schema: Arc<ModelSchema>,
        fetch_method: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            ValueType::ChildCollection {
                schema,
                fetch_method: Some(fetch_method.into()),
            },
        )
    }

    pub fn key(mut self) -> Self {
        self.flags.key = true;
        self
    }

    pub fn parent_key(mut self) -> Self {
        self.flags.parent_key = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags.read_only = true;
        self
    }

    pub fn not_on_wire_in(mut self) -> Self {
        self.flags.on_wire_in = false;
        self
    }

    pub fn not_on_wire_out(mut self) -> Self {
        self.flags.on_wire_out = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn is_key(&self) -> bool {
        self.flags.key
    }

    pub fn is_parent_key(&self) -> bool {
        self.flags.parent_key
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.read_only
    }

    pub fn is_on_wire_in(&self) -> bool {
        self.flags.on_wire_in
    }

    pub fn is_on_wire_out(&self) -> bool {
        self.flags.on_wire_out
    }

    pub fn is_child(&self) -> bool {
        self.value_type.is_child()
    }
}

/// Read access to scalar property values by name.
pub trait PropertyRead {
    fn read(&self, name: &str) -> Option<&Value>;
}

/// How the key of a model type is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDefinition {
    /// No key properties: the whole wire projection identifies the instance.
    WholeProjection,
    /// A single key property; the key is its scalar value.
    Single(usize),
    /// Several key properties; the key is an object of their values.
    Composite(Vec<usize>),
}

/// Ordered collection of the property descriptors of one model type.
#[derive(Debug)]
pub struct PropertyManager {
    model_name: String,
    items: Vec<PropertyDescriptor>,
    children: OnceLock<Vec<usize>>,
    key: OnceLock<KeyDefinition>,
}

impl PropertyManager {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            items: Vec::new(),
            children: OnceLock::new(),
            key: OnceLock::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Appends a descriptor and resets the derived views.
    pub fn add(&mut self, descriptor: PropertyDescriptor) -> Result<(), PortalError> {
        if self.index_of(descriptor.name()).is_some() {
            return Err(PortalError::DuplicateProperty(descriptor.name().to_string()));
        }
        self.items.push(descriptor);
        self.children = OnceLock::new();
        self.key = OnceLock::new();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.items.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.items.iter().find(|p| p.name == name)
    }

    pub fn at(&self, index: usize) -> &PropertyDescriptor {
        &self.items[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|p| p.name == name)
    }

    /// Indices of the child and child-collection properties, in declaration order.
    pub fn children(&self) -> &[usize] {
        self.children.get_or_init(|| {
            self.items
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_child())
                .map(|(i, _)| i)
                .collect()
        })
    }

    pub fn key_definition(&self) -> &KeyDefinition {
        self.key.get_or_init(|| {
            let keys: Vec<usize> = self
                .items
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_key() && !p.is_child())
                .map(|(i, _)| i)
                .collect();
            match keys.as_slice() {
                [] => KeyDefinition::WholeProjection,
                [single] => KeyDefinition::Single(*single),
                _ => KeyDefinition::Composite(keys),
            }
        })
    }

    /// Scalar properties that are written into transfer objects.
    pub fn wire_out(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.items.iter().filter(|p| !p.is_child() && p.is_on_wire_out())
    }

    /// Scalar properties that are read back from transfer objects.
    pub fn wire_in(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.items.iter().filter(|p| !p.is_child() && p.is_on_wire_in())
    }

    /// Computes the key of an instance.
    pub fn key_of(&self, values: &dyn PropertyRead) -> Value {
        let value_of = |p: &PropertyDescriptor| values.read(p.name()).cloned().unwrap_or(Value::Null);
        match self.key_definition() {
            KeyDefinition::Single(index) => value_of(&self.items[*index]),
            KeyDefinition::Composite(indices) => {
                let map: Map<String, Value> = indices
                    .iter()
                    .map(|i| (self.items[*i].name.clone(), value_of(&self.items[*i])))
                    .collect();
                Value::Object(map)
            }
            KeyDefinition::WholeProjection => {
                let map: Map<String, Value> = self
                    .wire_out()
                    .map(|p| (p.name.clone(), value_of(p)))
                    .collect();
                Value::Object(map)
            }
        }
    }

    /// Key property names with their values, handed down to children so they
    /// can fill their parent-key properties.
    pub fn key_values(&self, values: &dyn PropertyRead) -> Map<String, Value> {
        self.items
            .iter()
            .filter(|p| p.is_key() && !p.is_child())
            .map(|p| (p.name.clone(), values.read(p.name()).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}
