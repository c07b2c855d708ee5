//! # Sample DAOs
//!
//! One DAO per model type, all working on the injected
//! [`MemoryDatabase`]. Every call checks that its connection is a
//! [`MemorySession`], so a DAO used with a foreign connection manager fails
//! loudly instead of writing outside the transaction.
//!
//! The editable DAOs share [`TableAccess`] for the `insert` / `update` /
//! `remove` trio; what differs per model is `create` defaults and the fetch
//! methods.

pub mod address_dao;
pub mod blanket_order_dao;
pub mod blanket_order_item_dao;
pub mod blanket_order_view_dao;
pub mod clear_schedule_dao;

pub use address_dao::AddressDao;
pub use blanket_order_dao::BlanketOrderDao;
pub use blanket_order_item_dao::BlanketOrderItemDao;
pub use blanket_order_view_dao::BlanketOrderViewDao;
pub use clear_schedule_dao::ClearScheduleDao;

use crate::error::SampleError;
use crate::storage::{MemoryDatabase, MemorySession, Row};
use data_portal::Connection;
use serde_json::{json, Value};

pub const ORDER_TABLE: &str = "blanketOrder";
pub const ADDRESS_TABLE: &str = "address";
pub const ITEM_TABLE: &str = "blanketOrderItem";

pub(crate) fn session(connection: &Connection) -> Result<&MemorySession, SampleError> {
    connection
        .downcast_ref::<MemorySession>()
        .ok_or(SampleError::NotASession)
}

pub(crate) fn into_row(argument: Value) -> Result<Row, SampleError> {
    match argument {
        Value::Object(row) => Ok(row),
        other => Err(SampleError::NotAnObject(other.to_string())),
    }
}

pub(crate) fn key_of(argument: &Value, column: &str) -> Result<i64, SampleError> {
    argument
        .get(column)
        .and_then(Value::as_i64)
        .ok_or_else(|| SampleError::MissingKey(column.to_string()))
}

/// Rows of `table` whose `column` equals `key`.
pub(crate) fn rows_where(db: &MemoryDatabase, table: &str, column: &str, key: i64) -> Vec<Row> {
    let key = Value::from(key);
    db.select(table, |row| row.get(column) == Some(&key))
}

pub(crate) fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

/// Row-level writes of one table keyed by an auto-increment column.
#[derive(Debug, Clone)]
pub struct TableAccess {
    db: MemoryDatabase,
    table: &'static str,
    key_column: &'static str,
}

impl TableAccess {
    pub fn new(db: MemoryDatabase, table: &'static str, key_column: &'static str) -> Self {
        Self {
            db,
            table,
            key_column,
        }
    }

    pub fn db(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Stores the DTO and answers with the generated key.
    pub fn insert(&self, dto: Value) -> Result<Value, SampleError> {
        let mut row = into_row(dto)?;
        row.remove(self.key_column);
        let key = self.db.insert(self.table, self.key_column, row);
        Ok(json!({ self.key_column: key }))
    }

    /// Overwrites the stored row with the DTO's values.
    pub fn update(&self, dto: Value) -> Result<Row, SampleError> {
        let key = key_of(&dto, self.key_column)?;
        let mut row = into_row(dto)?;
        row.remove(self.key_column);
        self.db.update(self.table, key, row)
    }

    /// Deletes the row named by the model key, a bare integer.
    pub fn remove(&self, key: &Value) -> Result<(), SampleError> {
        let key = key
            .as_i64()
            .ok_or_else(|| SampleError::MissingKey(self.key_column.to_string()))?;
        self.db.delete(self.table, key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_access_round_trip() {
        let access = TableAccess::new(MemoryDatabase::new(), ITEM_TABLE, "orderItemKey");
        let returned = access
            .insert(json!({"orderItemKey": null, "orderKey": 4, "quantity": 2}))
            .unwrap();
        assert_eq!(returned, json!({"orderItemKey": 1}));

        let row = access
            .update(json!({"orderItemKey": 1, "quantity": 3}))
            .unwrap();
        assert_eq!(row["quantity"], json!(3));
        assert_eq!(row["orderKey"], json!(4));

        assert_eq!(rows_where(access.db(), ITEM_TABLE, "orderKey", 4).len(), 1);
        access.remove(&json!(1)).unwrap();
        assert!(access.remove(&json!(1)).is_err());
        assert!(matches!(
            access.remove(&json!({"orderItemKey": 1})),
            Err(SampleError::MissingKey(_))
        ));
        assert!(matches!(
            access.update(json!({"quantity": 3})),
            Err(SampleError::MissingKey(_))
        ));
    }
}
