//! # Data Access Objects
//!
//! A DAO is a named object exposing some subset of `create`, `fetch`,
//! relationship fetchers such as `fetchForOrder`, `insert`, `update`,
//! `remove`, `execute` and any other method a model declares. The portal only
//! ever reaches a DAO through [`run_method`], which checks that the method
//! exists before calling it.
//!
//! DAOs exchange data transfer objects as `serde_json::Value`s.

use crate::connection::Connection;
use crate::error::PortalError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Data transfer object exchanged with DAOs.
pub type Dto = Value;

#[async_trait]
pub trait Dao: Send + Sync {
    fn name(&self) -> &str;

    fn has_method(&self, method: &str) -> bool;

    /// Invokes `method`. Only called after [`Dao::has_method`] said yes.
    async fn call(
        &self,
        method: &str,
        connection: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError>;
}

/// Runs a named DAO method, failing with [`PortalError::NoSuchMethod`] if the
/// DAO does not expose it.
pub async fn run_method(
    dao: &dyn Dao,
    method: &str,
    connection: &Connection,
    argument: Value,
) -> Result<Value, PortalError> {
    if !dao.has_method(method) {
        return Err(PortalError::NoSuchMethod {
            dao: dao.name().to_string(),
            method: method.to_string(),
        });
    }
    debug!(dao = dao.name(), method, ?argument, "DAO call");
    dao.call(method, connection, argument).await
}

/// Resolves the DAO serving a model type on a data source.
pub trait DaoBuilder: Send + Sync {
    fn build(&self, data_source: &str, model_name: &str) -> Result<Arc<dyn Dao>, PortalError>;
}

/// Standard [`DaoBuilder`]: DAOs registered per model name, optionally pinned
/// to one data source.
#[derive(Default, Clone)]
pub struct DaoRegistry {
    by_source: HashMap<(String, String), Arc<dyn Dao>>,
    by_model: HashMap<String, Arc<dyn Dao>>,
}

impl DaoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a DAO for `model_name` on any data source.
    pub fn register(mut self, model_name: impl Into<String>, dao: Arc<dyn Dao>) -> Self {
        self.by_model.insert(model_name.into(), dao);
        self
    }

    /// Registers a DAO for `model_name` on one data source only.
    pub fn register_for(
        mut self,
        data_source: impl Into<String>,
        model_name: impl Into<String>,
        dao: Arc<dyn Dao>,
    ) -> Self {
        self.by_source
            .insert((data_source.into(), model_name.into()), dao);
        self
    }
}

impl DaoBuilder for DaoRegistry {
    fn build(&self, data_source: &str, model_name: &str) -> Result<Arc<dyn Dao>, PortalError> {
        self.by_source
            .get(&(data_source.to_string(), model_name.to_string()))
            .or_else(|| self.by_model.get(model_name))
            .cloned()
            .ok_or_else(|| PortalError::DaoNotFound {
                model: model_name.to_string(),
                data_source: data_source.to_string(),
            })
    }
}
