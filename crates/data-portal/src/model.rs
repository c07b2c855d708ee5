//! # Model Instances
//!
//! A [`Model`] is one live business object: a schema, a slot per property,
//! its lifecycle state and the broken rules of its last validation pass.
//!
//! This module holds the synchronous surface: property access, validation,
//! permission checks, removal requests and DTO/CTO conversion. The async
//! data-portal operations (`create`, `fetch`, `save`, `execute`) live in
//! [`crate::portal`].
//!
//! ## Property access
//!
//! | Method | Authorization | State change |
//! |--------|---------------|--------------|
//! | [`Model::get`] | read rule | none |
//! | [`Model::set`] | write rule | `changed`, self-dirty |
//! | [`Model::property_value`] | none | none |
//! | [`Model::set_property_value`] | none | none |

use crate::collection::ModelCollection;
use crate::config::{NoAccessBehavior, PortalConfig};
use crate::dao::{Dao, Dto};
use crate::error::PortalError;
use crate::property::PropertyRead;
use crate::rules::{AuthorizationAction, AuthorizationContext, BrokenRuleList};
use crate::schema::{ModelKind, ModelSchema};
use crate::state::{transition, LifecycleCell, ModelState, Transition};
use crate::store::{PropertyStore, PropertyValue};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Model {
    pub(crate) schema: Arc<ModelSchema>,
    pub(crate) portal: Arc<PortalConfig>,
    pub(crate) lifecycle: LifecycleCell,
    pub(crate) store: PropertyStore,
    pub(crate) broken_rules: BrokenRuleList,
}

impl Model {
    /// A new, uninitialized root instance. Call `create` or `fetch` next.
    pub fn new(schema: Arc<ModelSchema>, portal: Arc<PortalConfig>) -> Self {
        Self::with_lifecycle(schema, portal, LifecycleCell::new())
    }

    pub(crate) fn new_child(
        schema: Arc<ModelSchema>,
        portal: Arc<PortalConfig>,
        parent: &LifecycleCell,
    ) -> Self {
        Self::with_lifecycle(schema, portal, LifecycleCell::with_parent(parent))
    }

    fn with_lifecycle(
        schema: Arc<ModelSchema>,
        portal: Arc<PortalConfig>,
        lifecycle: LifecycleCell,
    ) -> Self {
        let store = PropertyStore::new(schema.clone(), &portal, &lifecycle);
        Self {
            schema,
            portal,
            lifecycle,
            store,
            broken_rules: BrokenRuleList::new(),
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn portal(&self) -> &Arc<PortalConfig> {
        &self.portal
    }

    /// `None` until the first create or fetch.
    pub fn state(&self) -> Option<ModelState> {
        self.lifecycle.state()
    }

    pub fn is_dirty(&self) -> bool {
        self.lifecycle.lock().is_dirty()
    }

    pub fn is_self_dirty(&self) -> bool {
        self.lifecycle.lock().is_self_dirty()
    }

    pub fn values(&self) -> &dyn PropertyRead {
        &self.store
    }

    // --- property access -------------------------------------------------

    /// Reads a scalar property, honoring read rules. Returns `None` for
    /// unknown or child properties and when reading is denied.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if !self.can_read(name) {
            debug!(model = self.name(), property = name, "Read denied");
            return None;
        }
        self.store.read(name)
    }

    /// Writes a scalar property, honoring write rules. A write that changes
    /// the stored value marks the model as changed.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), PortalError> {
        if self.schema.kind() == ModelKind::ReadOnly {
            return Err(PortalError::ReadOnlyModel(self.name().to_string()));
        }
        let descriptor =
            self.schema
                .properties()
                .get(name)
                .ok_or_else(|| PortalError::UnknownProperty {
                    model: self.name().to_string(),
                    property: name.to_string(),
                })?;
        if descriptor.is_child() {
            return Err(PortalError::ChildProperty(name.to_string()));
        }
        if descriptor.is_read_only() {
            return Err(PortalError::ReadOnlyProperty(name.to_string()));
        }
        if !descriptor.value_type().accepts(&value) {
            return Err(PortalError::TypeMismatch {
                property: name.to_string(),
                expected: format!("{:?}", descriptor.value_type()),
            });
        }
        let action = AuthorizationAction::WriteProperty(name.to_string());
        if !self.authorize(&action)? {
            return Ok(());
        }
        if self.store.read(name) == Some(&value) {
            return Ok(());
        }
        self.lifecycle.mark_as_changed(true)?;
        self.store.set_scalar(name, value)
    }

    /// Reads a scalar property without any rule check.
    pub fn property_value(&self, name: &str) -> Option<&Value> {
        self.store.read(name)
    }

    /// Writes a scalar property without rule checks or state change.
    pub fn set_property_value(&mut self, name: &str, value: Value) -> Result<(), PortalError> {
        self.store.set_scalar(name, value)
    }

    pub fn child(&self, name: &str) -> Result<&Model, PortalError> {
        match self.store.slot(name) {
            Some(PropertyValue::Child(child)) => Ok(child),
            Some(_) => Err(PortalError::NotAChildProperty(name.to_string())),
            None => Err(self.unknown(name)),
        }
    }

    pub fn child_mut(&mut self, name: &str) -> Result<&mut Model, PortalError> {
        let unknown = self.unknown(name);
        match self.store.slot_mut(name) {
            Some(PropertyValue::Child(child)) => Ok(child),
            Some(_) => Err(PortalError::NotAChildProperty(name.to_string())),
            None => Err(unknown),
        }
    }

    pub fn children(&self, name: &str) -> Result<&ModelCollection, PortalError> {
        match self.store.slot(name) {
            Some(PropertyValue::Collection(collection)) => Ok(collection),
            Some(_) => Err(PortalError::NotAChildProperty(name.to_string())),
            None => Err(self.unknown(name)),
        }
    }

    pub fn children_mut(&mut self, name: &str) -> Result<&mut ModelCollection, PortalError> {
        let unknown = self.unknown(name);
        match self.store.slot_mut(name) {
            Some(PropertyValue::Collection(collection)) => Ok(collection),
            Some(_) => Err(PortalError::NotAChildProperty(name.to_string())),
            None => Err(unknown),
        }
    }

    fn unknown(&self, name: &str) -> PortalError {
        PortalError::UnknownProperty {
            model: self.name().to_string(),
            property: name.to_string(),
        }
    }

    // --- keys ------------------------------------------------------------

    /// The key of this instance: the scalar key, an object of the key
    /// properties, or the whole wire projection for keyless types. Also the
    /// filter handed to the DAO `remove` method.
    pub fn key(&self) -> Value {
        self.schema.properties().key_of(&self.store)
    }

    /// Key property values handed down to children on save.
    pub fn key_values(&self) -> Map<String, Value> {
        self.schema.properties().key_values(&self.store)
    }

    /// Copies the matching parent keys into the parent-key properties.
    pub(crate) fn copy_parent_keys(&mut self, parent_keys: &Map<String, Value>) {
        let targets: Vec<String> = self
            .schema
            .properties()
            .iter()
            .filter(|p| p.is_parent_key() && parent_keys.contains_key(p.name()))
            .map(|p| p.name().to_string())
            .collect();
        for name in targets {
            if let Some(PropertyValue::Scalar(slot)) = self.store.slot_mut(&name) {
                *slot = parent_keys[&name].clone();
            }
        }
    }

    // --- validation ------------------------------------------------------

    /// Runs every validation rule and rebuilds the broken-rule list.
    pub fn check_rules(&mut self) {
        self.broken_rules.clear();
        let rules = self.schema.rules();
        for descriptor in self.schema.properties().iter() {
            rules.validate(descriptor, &self.store, &mut self.broken_rules);
        }
        self.lifecycle.lock().set_validated();
        if !self.broken_rules.is_empty() {
            debug!(model = self.name(), broken = self.broken_rules.len(), "Validation failed");
        }
    }

    /// Whether the own properties pass validation. Revalidates only when a
    /// change happened since the last pass.
    pub fn is_valid(&mut self) -> bool {
        if !self.lifecycle.lock().is_validated() {
            self.check_rules();
        }
        self.broken_rules.is_empty()
    }

    pub fn broken_rules(&self) -> &BrokenRuleList {
        &self.broken_rules
    }

    // --- authorization ---------------------------------------------------

    pub fn can_read(&self, property: &str) -> bool {
        self.can_do(&AuthorizationAction::ReadProperty(property.to_string()))
    }

    pub fn can_write(&self, property: &str) -> bool {
        self.can_do(&AuthorizationAction::WriteProperty(property.to_string()))
    }

    pub fn can_execute(&self, method: &str) -> bool {
        self.can_do(&AuthorizationAction::ExecuteMethod(method.to_string()))
    }

    pub fn can_do(&self, action: &AuthorizationAction) -> bool {
        has_permission(&self.schema, &self.portal, action)
    }

    pub(crate) fn authorize(&self, action: &AuthorizationAction) -> Result<bool, PortalError> {
        authorize(&self.schema, &self.portal, action)
    }

    // --- removal ---------------------------------------------------------

    /// Requests removal. Pristine and changed models become marked for
    /// removal together with all their children; a created model is dropped
    /// straight to removed. The actual delete happens on `save`.
    pub fn remove(&mut self) -> Result<(), PortalError> {
        if self.schema.kind() != ModelKind::Editable {
            return Err(PortalError::ReadOnlyModel(self.name().to_string()));
        }
        match transition(self.state(), ModelState::MarkedForRemoval)? {
            Transition::NoOp => Ok(()),
            Transition::Apply(_) => {
                self.remove_children()?;
                self.lifecycle.mark_for_removal()?;
                Ok(())
            }
        }
    }

    fn remove_children(&mut self) -> Result<(), PortalError> {
        for (_, slot) in self.store.child_slots_mut() {
            match slot {
                PropertyValue::Child(child) if child.state().is_some() => child.remove()?,
                PropertyValue::Collection(collection) => collection.mark_for_removal()?,
                _ => {}
            }
        }
        Ok(())
    }

    // --- transfer objects ------------------------------------------------

    /// Storage transfer object of the scalar properties.
    pub fn to_dto(&self) -> Dto {
        if let Some(to_dto) = &self.schema.extensions().to_dto {
            return to_dto(&self.store);
        }
        let map: Map<String, Value> = self
            .schema
            .properties()
            .wire_out()
            .map(|p| {
                let value = self.store.read(p.name()).cloned().unwrap_or(Value::Null);
                (p.name().to_string(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// Copies the scalar properties present in `dto` into the model.
    /// Unchecked: no rules, no state change.
    pub fn from_dto(&mut self, dto: &Dto) -> Result<(), PortalError> {
        if let Some(from_dto) = self.schema.extensions().from_dto.clone() {
            return from_dto(dto, &mut self.store);
        }
        let Some(object) = dto.as_object() else {
            return Ok(());
        };
        let schema = self.schema.clone();
        for descriptor in schema.properties().wire_in() {
            if let Some(value) = object.get(descriptor.name()) {
                self.store.set_scalar(descriptor.name(), value.clone())?;
            }
        }
        Ok(())
    }

    /// Client transfer object: scalars plus children, recursively.
    pub fn to_cto(&self) -> Value {
        if let Some(to_cto) = &self.schema.extensions().to_cto {
            return to_cto(self);
        }
        let map: Map<String, Value> = self
            .schema
            .properties()
            .iter()
            .zip(self.store.slots.iter())
            .filter(|(p, _)| p.is_child() || p.is_on_wire_out())
            .map(|(p, slot)| {
                let value = match slot {
                    PropertyValue::Scalar(value) => value.clone(),
                    PropertyValue::Child(child) if child.state().is_some() => child.to_cto(),
                    PropertyValue::Child(_) => Value::Null,
                    PropertyValue::Collection(collection) => collection.to_cto(),
                };
                (p.name().to_string(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// Applies client edits through the checked setters, recursing into
    /// children. Read-only and off-wire properties are left alone.
    pub fn from_cto(&mut self, cto: &Value) -> Result<(), PortalError> {
        if let Some(from_cto) = self.schema.extensions().from_cto.clone() {
            return from_cto(self, cto);
        }
        let Some(object) = cto.as_object() else {
            return Ok(());
        };
        let schema = self.schema.clone();
        for (index, descriptor) in schema.properties().iter().enumerate() {
            let Some(value) = object.get(descriptor.name()) else {
                continue;
            };
            if !descriptor.is_child() {
                if descriptor.is_on_wire_in() && !descriptor.is_read_only() {
                    self.set(descriptor.name(), value.clone())?;
                }
                continue;
            }
            match &mut self.store.slots[index] {
                PropertyValue::Child(child) if child.state().is_some() => child.from_cto(value)?,
                PropertyValue::Collection(collection) => collection.from_cto(value)?,
                _ => {}
            }
        }
        Ok(())
    }

    // --- DAO resolution --------------------------------------------------

    pub(crate) fn data_source(&self) -> &str {
        data_source(&self.schema, &self.portal)
    }

    pub(crate) fn dao(&self) -> Result<Arc<dyn Dao>, PortalError> {
        resolve_dao(&self.schema, &self.portal)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.schema.name())
            .field("state", &self.state())
            .field("values", &self.to_dto())
            .finish_non_exhaustive()
    }
}

pub(crate) fn data_source<'a>(schema: &'a ModelSchema, portal: &'a PortalConfig) -> &'a str {
    schema
        .data_source()
        .unwrap_or_else(|| portal.default_data_source())
}

pub(crate) fn resolve_dao(
    schema: &ModelSchema,
    portal: &PortalConfig,
) -> Result<Arc<dyn Dao>, PortalError> {
    let source = data_source(schema, portal);
    match &schema.extensions().dao_builder {
        Some(builder) => builder.build(source, schema.name()),
        None => portal.dao_builder().build(source, schema.name()),
    }
}

pub(crate) fn has_permission(
    schema: &ModelSchema,
    portal: &PortalConfig,
    action: &AuthorizationAction,
) -> bool {
    let user = portal.current_user();
    let locale = portal.current_locale();
    schema.rules().has_permission(&AuthorizationContext {
        model: schema.name(),
        action,
        user: user.as_deref(),
        locale: locale.as_deref(),
    })
}

/// Permission gate. `Ok(false)` means skip the operation.
pub(crate) fn authorize(
    schema: &ModelSchema,
    portal: &PortalConfig,
    action: &AuthorizationAction,
) -> Result<bool, PortalError> {
    if has_permission(schema, portal, action) {
        return Ok(true);
    }
    match portal.no_access_behavior() {
        NoAccessBehavior::Skip => {
            debug!(model = schema.name(), %action, "Access denied, skipping");
            Ok(false)
        }
        NoAccessBehavior::Warn => {
            warn!(model = schema.name(), %action, "Access denied, skipping");
            Ok(false)
        }
        NoAccessBehavior::Raise => Err(PortalError::AccessDenied {
            model: schema.name().to_string(),
            action: action.to_string(),
        }),
    }
}
