//! # Extension Points
//!
//! A model type may replace parts of the standard data-portal behavior. The
//! replacements are collected in an [`ExtensionSet`] when the type is
//! registered, and the portal checks for them before falling back to the
//! standard path.
//!
//! | Hook | Replaces |
//! |------|----------|
//! | `data_create` … `data_execute` | the DAO call of that operation |
//! | `to_dto` / `from_dto` | storage transfer object conversion |
//! | `to_cto` / `from_cto` | client transfer object conversion |
//! | `dao_builder` | DAO resolution for this model type |
//!
//! Permission checks, child cascades and state transitions stay with the
//! portal whether or not a hook is supplied.

use crate::context::DataPortalContext;
use crate::dao::{DaoBuilder, Dto};
use crate::error::PortalError;
use crate::model::Model;
use crate::property::PropertyRead;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Custom implementation of one data-portal operation.
///
/// The hook reads and writes the model's properties through the context. The
/// returned value is the DTO the children are loaded from (fetch) or is
/// ignored (other operations); return `Value::Null` when there is none.
#[async_trait]
pub trait DataHook: Send + Sync {
    async fn run(
        &self,
        ctx: &mut DataPortalContext<'_>,
        argument: Value,
    ) -> Result<Value, PortalError>;
}

/// Write access to scalar property values by name.
pub trait PropertyWrite {
    fn write(&mut self, name: &str, value: Value) -> Result<(), PortalError>;
}

pub type ToDto = Arc<dyn Fn(&dyn PropertyRead) -> Dto + Send + Sync>;
pub type FromDto = Arc<dyn Fn(&Dto, &mut dyn PropertyWrite) -> Result<(), PortalError> + Send + Sync>;
pub type ToCto = Arc<dyn Fn(&Model) -> Value + Send + Sync>;
pub type FromCto = Arc<dyn Fn(&mut Model, &Value) -> Result<(), PortalError> + Send + Sync>;

/// Optional overrides of one model type.
#[derive(Default, Clone)]
pub struct ExtensionSet {
    pub(crate) data_create: Option<Arc<dyn DataHook>>,
    pub(crate) data_fetch: Option<Arc<dyn DataHook>>,
    pub(crate) data_insert: Option<Arc<dyn DataHook>>,
    pub(crate) data_update: Option<Arc<dyn DataHook>>,
    pub(crate) data_remove: Option<Arc<dyn DataHook>>,
    pub(crate) data_execute: Option<Arc<dyn DataHook>>,
    pub(crate) to_dto: Option<ToDto>,
    pub(crate) from_dto: Option<FromDto>,
    pub(crate) to_cto: Option<ToCto>,
    pub(crate) from_cto: Option<FromCto>,
    pub(crate) dao_builder: Option<Arc<dyn DaoBuilder>>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_create(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.data_create = Some(hook);
        self
    }

    pub fn data_fetch(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.data_fetch = Some(hook);
        self
    }

    pub fn data_insert(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.data_insert = Some(hook);
        self
    }

    pub fn data_update(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.data_update = Some(hook);
        self
    }

    pub fn data_remove(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.data_remove = Some(hook);
        self
    }

    pub fn data_execute(mut self, hook: Arc<dyn DataHook>) -> Self {
        self.data_execute = Some(hook);
        self
    }

    pub fn to_dto(mut self, f: impl Fn(&dyn PropertyRead) -> Dto + Send + Sync + 'static) -> Self {
        self.to_dto = Some(Arc::new(f));
        self
    }

    pub fn from_dto(
        mut self,
        f: impl Fn(&Dto, &mut dyn PropertyWrite) -> Result<(), PortalError> + Send + Sync + 'static,
    ) -> Self {
        self.from_dto = Some(Arc::new(f));
        self
    }

    pub fn to_cto(mut self, f: impl Fn(&Model) -> Value + Send + Sync + 'static) -> Self {
        self.to_cto = Some(Arc::new(f));
        self
    }

    pub fn from_cto(
        mut self,
        f: impl Fn(&mut Model, &Value) -> Result<(), PortalError> + Send + Sync + 'static,
    ) -> Self {
        self.from_cto = Some(Arc::new(f));
        self
    }

    pub fn dao_builder(mut self, builder: Arc<dyn DaoBuilder>) -> Self {
        self.dao_builder = Some(builder);
        self
    }
}

impl fmt::Debug for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionSet")
            .field("data_create", &self.data_create.is_some())
            .field("data_fetch", &self.data_fetch.is_some())
            .field("data_insert", &self.data_insert.is_some())
            .field("data_update", &self.data_update.is_some())
            .field("data_remove", &self.data_remove.is_some())
            .field("data_execute", &self.data_execute.is_some())
            .field("to_dto", &self.to_dto.is_some())
            .field("from_dto", &self.from_dto.is_some())
            .field("to_cto", &self.to_cto.is_some())
            .field("from_cto", &self.from_cto.is_some())
            .field("dao_builder", &self.dao_builder.is_some())
            .finish()
    }
}
