//! # Factory
//!
//! [`DataPortal`] is the entry point applications use: it binds a shared
//! [`PortalConfig`] and hands out models and collections that already went
//! through their first data-portal call.
//!
//! ```rust,ignore
//! let portal = DataPortal::new(config);
//! let mut order = portal.create(&schemas.blanket_order).await?;
//! order.set("vendorName", json!("Blue Zebra"))?;
//! order.save().await?;
//!
//! let page = portal.fetch_collection(&schemas.order_view, json!({"page": 1})).await?;
//! ```
//!
//! A denied create or fetch is not an error: the model comes back
//! uninitialized (`state() == None`).

use crate::collection::ModelCollection;
use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::model::Model;
use crate::schema::ModelSchema;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DataPortal {
    config: Arc<PortalConfig>,
}

impl DataPortal {
    pub fn new(config: Arc<PortalConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<PortalConfig> {
        &self.config
    }

    /// An uninitialized instance, for callers that drive the operations.
    pub fn instance(&self, schema: &Arc<ModelSchema>) -> Model {
        Model::new(schema.clone(), self.config.clone())
    }

    pub async fn create(&self, schema: &Arc<ModelSchema>) -> Result<Model, PortalError> {
        let mut model = self.instance(schema);
        model.create().await?;
        Ok(model)
    }

    pub async fn fetch(&self, schema: &Arc<ModelSchema>, filter: Value) -> Result<Model, PortalError> {
        self.fetch_with(schema, "fetch", filter).await
    }

    pub async fn fetch_with(
        &self,
        schema: &Arc<ModelSchema>,
        method: &str,
        filter: Value,
    ) -> Result<Model, PortalError> {
        let mut model = self.instance(schema);
        model.fetch_with(method, filter).await?;
        Ok(model)
    }

    pub fn create_collection(&self, schema: &Arc<ModelSchema>) -> Result<ModelCollection, PortalError> {
        let mut collection = ModelCollection::new(schema.clone(), self.config.clone());
        collection.create()?;
        Ok(collection)
    }

    pub async fn fetch_collection(
        &self,
        schema: &Arc<ModelSchema>,
        filter: Value,
    ) -> Result<ModelCollection, PortalError> {
        self.fetch_collection_with(schema, "fetch", filter).await
    }

    pub async fn fetch_collection_with(
        &self,
        schema: &Arc<ModelSchema>,
        method: &str,
        filter: Value,
    ) -> Result<ModelCollection, PortalError> {
        let mut collection = ModelCollection::new(schema.clone(), self.config.clone());
        collection.fetch_with(method, filter).await?;
        Ok(collection)
    }

    /// Creates a command object, assigns `arguments` (an object of property
    /// values) and runs its `execute` method.
    pub async fn execute(
        &self,
        schema: &Arc<ModelSchema>,
        arguments: Value,
    ) -> Result<Model, PortalError> {
        let mut command = self.create(schema).await?;
        if let Value::Object(arguments) = arguments {
            for (name, value) in arguments {
                command.set(&name, value)?;
            }
        }
        command.execute().await?;
        Ok(command)
    }
}
