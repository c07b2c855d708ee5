//! # Storage Port
//!
//! The sample keeps its data in a [`MemoryDatabase`]: named tables of JSON
//! rows with auto-increment keys. DAOs get the database injected when the
//! [`OrderSystem`](crate::lifecycle::OrderSystem) is wired; the
//! [`MemoryConnectionManager`] hands out [`MemorySession`] connections and
//! implements transactions as snapshot and restore.

pub mod database;
pub mod session;

pub use database::{MemoryDatabase, Row, Tables};
pub use session::{MemoryConnectionManager, MemorySession};
