//! # Model Schemas
//!
//! A [`ModelSchema`] is the registration of one model type: its name, kind,
//! data source, properties, rules and extensions. It is compiled once and
//! shared by every instance through an `Arc`.
//!
//! ```rust
//! use data_portal::{ModelKind, ModelSchema, PropertyDescriptor, Rules};
//!
//! let address = ModelSchema::builder("Address")
//!     .property(PropertyDescriptor::integer("addressKey").key().read_only())
//!     .property(PropertyDescriptor::integer("orderKey").parent_key().read_only())
//!     .property(PropertyDescriptor::text("city"))
//!     .rules(Rules::new().required("city", "City is required."))
//!     .build()
//!     .unwrap();
//!
//! let order = ModelSchema::builder("BlanketOrder")
//!     .data_source("orders")
//!     .property(PropertyDescriptor::integer("orderKey").key().read_only())
//!     .property(PropertyDescriptor::text("vendorName"))
//!     .property(PropertyDescriptor::child("address", address))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(order.kind(), ModelKind::Editable);
//! assert_eq!(order.properties().children().len(), 1);
//! ```

use crate::error::PortalError;
use crate::extension::ExtensionSet;
use crate::property::{PropertyDescriptor, PropertyManager};
use crate::rules::{RuleManager, Rules};
use std::fmt;
use std::sync::Arc;

/// What a model type may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    /// Full create / fetch / save lifecycle.
    #[default]
    Editable,
    /// Fetch only; writes and saves are refused.
    ReadOnly,
    /// Command object: set arguments, then `execute`.
    Command,
}

pub struct ModelSchema {
    name: String,
    kind: ModelKind,
    data_source: Option<String>,
    properties: PropertyManager,
    rules: Arc<dyn RuleManager>,
    extensions: ExtensionSet,
}

impl ModelSchema {
    pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            name: name.into(),
            kind: ModelKind::Editable,
            data_source: None,
            properties: Vec::new(),
            rules: None,
            extensions: ExtensionSet::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// The data source this type is bound to, if not the configured default.
    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    pub fn properties(&self) -> &PropertyManager {
        &self.properties
    }

    pub fn rules(&self) -> &dyn RuleManager {
        self.rules.as_ref()
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("data_source", &self.data_source)
            .field("properties", &self.properties)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

pub struct ModelSchemaBuilder {
    name: String,
    kind: ModelKind,
    data_source: Option<String>,
    properties: Vec<PropertyDescriptor>,
    rules: Option<Arc<dyn RuleManager>>,
    extensions: ExtensionSet,
}

impl ModelSchemaBuilder {
    pub fn kind(mut self, kind: ModelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn read_only(self) -> Self {
        self.kind(ModelKind::ReadOnly)
    }

    pub fn command(self) -> Self {
        self.kind(ModelKind::Command)
    }

    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    pub fn rules(self, rules: Rules) -> Self {
        self.rule_manager(Arc::new(rules))
    }

    pub fn rule_manager(mut self, rules: Arc<dyn RuleManager>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn extensions(mut self, extensions: ExtensionSet) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn build(self) -> Result<Arc<ModelSchema>, PortalError> {
        let mut properties = PropertyManager::new(self.name.clone());
        for descriptor in self.properties {
            properties.add(descriptor)?;
        }
        Ok(Arc::new(ModelSchema {
            name: self.name,
            kind: self.kind,
            data_source: self.data_source,
            properties,
            rules: self.rules.unwrap_or_else(|| Arc::new(Rules::new())),
            extensions: self.extensions,
        }))
    }
}
