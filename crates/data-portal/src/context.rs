//! # Data Portal Context
//!
//! What an extension hook gets to work with: the model's property values,
//! the resolved DAO, the open connection or transaction, and the current user.
//! The context only lives for the duration of one hook call.

use crate::connection::Connection;
use crate::dao::{run_method, Dao};
use crate::error::PortalError;
use crate::property::PropertyRead;
use crate::store::PropertyStore;
use serde_json::Value;
use std::sync::Arc;

pub struct DataPortalContext<'a> {
    dao: Arc<dyn Dao>,
    connection: &'a Connection,
    user: Option<String>,
    locale: Option<String>,
    is_self_dirty: bool,
    store: &'a mut PropertyStore,
}

impl<'a> DataPortalContext<'a> {
    pub(crate) fn new(
        dao: Arc<dyn Dao>,
        connection: &'a Connection,
        user: Option<String>,
        locale: Option<String>,
        is_self_dirty: bool,
        store: &'a mut PropertyStore,
    ) -> Self {
        Self {
            dao,
            connection,
            user,
            locale,
            is_self_dirty,
            store,
        }
    }

    pub fn model_name(&self) -> &str {
        self.store.schema().name()
    }

    pub fn dao(&self) -> &dyn Dao {
        self.dao.as_ref()
    }

    pub fn connection(&self) -> &Connection {
        self.connection
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Whether the model's own properties changed since the last load or save.
    pub fn is_self_dirty(&self) -> bool {
        self.is_self_dirty
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.store.read(name)
    }

    /// Unchecked write: no authorization, no state change.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), PortalError> {
        self.store.set_scalar(name, value)
    }

    pub fn values(&self) -> &dyn PropertyRead {
        &*self.store
    }

    /// Calls a method on the model's DAO with this context's connection.
    pub async fn call(&self, method: &str, argument: Value) -> Result<Value, PortalError> {
        run_method(self.dao.as_ref(), method, self.connection, argument).await
    }
}
