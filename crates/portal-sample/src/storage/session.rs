//! Connections and transactions over a [`MemoryDatabase`].

use crate::error::SampleError;
use crate::storage::database::{MemoryDatabase, Tables};
use async_trait::async_trait;
use data_portal::{Connection, ConnectionManager, PortalError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The value behind every [`Connection`] handed out by
/// [`MemoryConnectionManager`]. A transactional session keeps the database
/// content from the moment it began, so a rollback can put it back.
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    snapshot: Option<Tables>,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Connection manager of the sample data source.
///
/// Rollback restores the whole database, so overlapping transactions would
/// undo each other's work; the sample runs one save at a time.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    db: MemoryDatabase,
    next_id: Arc<AtomicU64>,
    open: Arc<AtomicUsize>,
}

impl MemoryConnectionManager {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            db,
            ..Self::default()
        }
    }

    /// Sessions handed out and not yet given back.
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn session(&self, data_source: &str, snapshot: Option<Tables>) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.fetch_add(1, Ordering::SeqCst);
        debug!(data_source, session = id, transaction = snapshot.is_some(), "Session opened");
        Connection::new(MemorySession { id, snapshot })
    }

    fn release(&self, data_source: &str, connection: &Connection) -> Result<(), PortalError> {
        let session = connection
            .downcast_ref::<MemorySession>()
            .ok_or(SampleError::NotASession)?;
        self.open.fetch_sub(1, Ordering::SeqCst);
        debug!(data_source, session = session.id, "Session closed");
        Ok(())
    }
}

#[async_trait]
impl ConnectionManager for MemoryConnectionManager {
    async fn open_connection(&self, data_source: &str) -> Result<Connection, PortalError> {
        Ok(self.session(data_source, None))
    }

    async fn close_connection(
        &self,
        data_source: &str,
        connection: Connection,
    ) -> Result<(), PortalError> {
        self.release(data_source, &connection)
    }

    async fn begin_transaction(&self, data_source: &str) -> Result<Connection, PortalError> {
        Ok(self.session(data_source, Some(self.db.snapshot())))
    }

    async fn commit_transaction(
        &self,
        data_source: &str,
        connection: Connection,
    ) -> Result<(), PortalError> {
        self.release(data_source, &connection)
    }

    async fn rollback_transaction(
        &self,
        data_source: &str,
        connection: Connection,
    ) -> Result<(), PortalError> {
        if let Some(snapshot) = connection
            .downcast_ref::<MemorySession>()
            .and_then(|session| session.snapshot.clone())
        {
            self.db.restore(snapshot);
            debug!(data_source, "Database restored");
        }
        self.release(data_source, &connection)
    }
}
