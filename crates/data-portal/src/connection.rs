//! # Connections & Transactions
//!
//! The data portal never looks inside a connection. It asks a
//! [`ConnectionManager`] for one per top-level operation, hands it to every DAO
//! call of that operation (children included) and gives it back when done.
//!
//! - create / fetch: `open_connection` … `close_connection`
//! - insert / update / remove / execute: `begin_transaction` … `commit_transaction`
//!   or `rollback_transaction`
//!
//! Data sources without real transactions only need `open_connection` and
//! `close_connection`; the transactional methods fall back to them.

use crate::error::PortalError;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque, cloneable handle to whatever a data source calls a connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<dyn Any + Send + Sync>,
}

impl Connection {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// A connection that carries nothing, for data sources that need none.
    pub fn none() -> Self {
        Self::new(())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens and closes connections and transactions for named data sources.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn open_connection(&self, data_source: &str) -> Result<Connection, PortalError> {
        let _ = data_source;
        Err(PortalError::NotImplemented("ConnectionManager::open_connection".into()))
    }

    async fn close_connection(
        &self,
        data_source: &str,
        connection: Connection,
    ) -> Result<(), PortalError> {
        let _ = (data_source, connection);
        Err(PortalError::NotImplemented("ConnectionManager::close_connection".into()))
    }

    async fn begin_transaction(&self, data_source: &str) -> Result<Connection, PortalError> {
        self.open_connection(data_source).await
    }

    async fn commit_transaction(
        &self,
        data_source: &str,
        connection: Connection,
    ) -> Result<(), PortalError> {
        self.close_connection(data_source, connection).await
    }

    async fn rollback_transaction(
        &self,
        data_source: &str,
        connection: Connection,
    ) -> Result<(), PortalError> {
        self.close_connection(data_source, connection).await
    }
}

/// Connection manager for DAOs that keep no connection state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConnectionManager;

#[async_trait]
impl ConnectionManager for NoConnectionManager {
    async fn open_connection(&self, _data_source: &str) -> Result<Connection, PortalError> {
        Ok(Connection::none())
    }

    async fn close_connection(
        &self,
        _data_source: &str,
        _connection: Connection,
    ) -> Result<(), PortalError> {
        Ok(())
    }
}
