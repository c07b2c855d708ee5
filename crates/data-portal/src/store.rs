//! Per-instance property storage.
//!
//! A [`PropertyStore`] holds one slot per declared property, in declaration
//! order. Scalar slots hold a `serde_json::Value`; child slots own the child
//! model or collection outright, so a parent can hand out disjoint mutable
//! borrows of its children while it cascades an operation.

use crate::collection::ModelCollection;
use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::extension::PropertyWrite;
use crate::model::Model;
use crate::property::{PropertyDescriptor, PropertyRead, ValueType};
use crate::schema::ModelSchema;
use crate::state::LifecycleCell;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug)]
pub enum PropertyValue {
    Scalar(Value),
    Child(Box<Model>),
    Collection(ModelCollection),
}

impl PropertyValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            PropertyValue::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PropertyStore {
    schema: Arc<ModelSchema>,
    pub(crate) slots: Vec<PropertyValue>,
}

impl PropertyStore {
    /// Builds the slots of a new instance. Scalars start as `null`, single
    /// children start uninitialized and collections start empty; all of them
    /// report changes into `owner`.
    pub(crate) fn new(
        schema: Arc<ModelSchema>,
        portal: &Arc<PortalConfig>,
        owner: &LifecycleCell,
    ) -> Self {
        let slots = schema
            .properties()
            .iter()
            .map(|descriptor| match descriptor.value_type() {
                ValueType::Child(child) => PropertyValue::Child(Box::new(Model::new_child(
                    child.clone(),
                    portal.clone(),
                    owner,
                ))),
                ValueType::ChildCollection {
                    schema: item,
                    fetch_method,
                } => PropertyValue::Collection(ModelCollection::new_child(
                    item.clone(),
                    portal.clone(),
                    owner,
                    fetch_method.clone(),
                )),
                _ => PropertyValue::Scalar(Value::Null),
            })
            .collect();
        Self { schema, slots }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn slot(&self, name: &str) -> Option<&PropertyValue> {
        let index = self.schema.properties().index_of(name)?;
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut PropertyValue> {
        let index = self.schema.properties().index_of(name)?;
        self.slots.get_mut(index)
    }

    /// Child and child-collection slots with their descriptors, in
    /// declaration order. Each slot is borrowed on its own, so the caller can
    /// drive all children at once.
    pub(crate) fn child_slots_mut(
        &mut self,
    ) -> impl Iterator<Item = (&PropertyDescriptor, &mut PropertyValue)> + '_ {
        let properties = self.schema.properties();
        let mut children = properties.children().iter().copied().peekable();
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, slot)| {
                children.next_if_eq(&index)?;
                Some((properties.at(index), slot))
            })
    }

    /// Stores a scalar without any check besides the property being a scalar.
    pub fn set_scalar(&mut self, name: &str, value: Value) -> Result<(), PortalError> {
        match self.slot_mut(name) {
            Some(PropertyValue::Scalar(slot)) => {
                *slot = value;
                Ok(())
            }
            Some(_) => Err(PortalError::ChildProperty(name.to_string())),
            None => Err(PortalError::UnknownProperty {
                model: self.schema.name().to_string(),
                property: name.to_string(),
            }),
        }
    }
}

impl PropertyRead for PropertyStore {
    fn read(&self, name: &str) -> Option<&Value> {
        self.slot(name).and_then(PropertyValue::as_scalar)
    }
}

impl PropertyWrite for PropertyStore {
    fn write(&mut self, name: &str, value: Value) -> Result<(), PortalError> {
        self.set_scalar(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::DaoRegistry;

    #[test]
    fn child_slots_follow_declaration_order() {
        let address = ModelSchema::builder("Address")
            .property(PropertyDescriptor::text("city"))
            .build()
            .unwrap();
        let line = ModelSchema::builder("Line")
            .property(PropertyDescriptor::integer("lineKey").key())
            .build()
            .unwrap();
        let order = ModelSchema::builder("Order")
            .property(PropertyDescriptor::integer("orderKey").key())
            .property(PropertyDescriptor::child("address", address))
            .property(PropertyDescriptor::text("vendorName"))
            .property(PropertyDescriptor::children("lines", line))
            .build()
            .unwrap();
        let portal = PortalConfig::builder()
            .dao_builder(Arc::new(DaoRegistry::new()))
            .build()
            .unwrap();

        let mut store = PropertyStore::new(order, &portal, &LifecycleCell::new());
        let children: Vec<(String, bool)> = store
            .child_slots_mut()
            .map(|(p, slot)| (p.name().to_string(), matches!(slot, PropertyValue::Collection(_))))
            .collect();

        assert_eq!(
            children,
            [("address".to_string(), false), ("lines".to_string(), true)]
        );
    }
}
