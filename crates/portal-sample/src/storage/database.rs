//! In-memory tables with auto-increment integer keys.

use crate::error::SampleError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// One stored row.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Default)]
struct Table {
    last_key: i64,
    rows: BTreeMap<i64, Row>,
}

/// The full content of a database, as captured for a rollback.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    tables: HashMap<String, Table>,
}

/// Shared handle to the database. Clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `row` under the next key of `table`, writing the key into
    /// `key_column`.
    pub fn insert(&self, table: &str, key_column: &str, mut row: Row) -> i64 {
        let mut tables = self.lock();
        let table_rows = tables.tables.entry(table.to_string()).or_default();
        table_rows.last_key += 1;
        let key = table_rows.last_key;
        row.insert(key_column.to_string(), Value::from(key));
        table_rows.rows.insert(key, row);
        trace!(table, key, "Row inserted");
        key
    }

    /// Merges `changes` into the stored row.
    pub fn update(&self, table: &str, key: i64, changes: Row) -> Result<Row, SampleError> {
        let mut tables = self.lock();
        let row = tables
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&key))
            .ok_or_else(|| SampleError::RowNotFound {
                table: table.to_string(),
                key,
            })?;
        row.extend(changes);
        Ok(row.clone())
    }

    pub fn delete(&self, table: &str, key: i64) -> Result<Row, SampleError> {
        self.lock()
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.remove(&key))
            .ok_or_else(|| SampleError::RowNotFound {
                table: table.to_string(),
                key,
            })
    }

    pub fn get(&self, table: &str, key: i64) -> Option<Row> {
        self.lock()
            .tables
            .get(table)
            .and_then(|t| t.rows.get(&key))
            .cloned()
    }

    /// Rows matching `filter`, in key order.
    pub fn select(&self, table: &str, filter: impl Fn(&Row) -> bool) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.values().filter(|row| filter(row)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub(crate) fn snapshot(&self) -> Tables {
        self.lock().clone()
    }

    pub(crate) fn restore(&self, tables: Tables) {
        *self.lock() = tables;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn keys_are_assigned_per_table() {
        let db = MemoryDatabase::new();
        assert_eq!(db.insert("order", "orderKey", row(json!({"vendorName": "A"}))), 1);
        assert_eq!(db.insert("order", "orderKey", row(json!({"vendorName": "B"}))), 2);
        assert_eq!(db.insert("item", "itemKey", Row::new()), 1);

        assert_eq!(db.get("order", 2).unwrap()["orderKey"], json!(2));
        assert_eq!(db.count("order"), 2);
    }

    #[test]
    fn deleted_keys_are_not_reused() {
        let db = MemoryDatabase::new();
        db.insert("order", "orderKey", Row::new());
        db.delete("order", 1).unwrap();
        assert_eq!(db.insert("order", "orderKey", Row::new()), 2);
        assert!(matches!(
            db.delete("order", 1),
            Err(SampleError::RowNotFound { key: 1, .. })
        ));
    }

    #[test]
    fn restore_discards_later_writes() {
        let db = MemoryDatabase::new();
        db.insert("order", "orderKey", row(json!({"vendorName": "A"})));
        let before = db.snapshot();

        db.update("order", 1, row(json!({"vendorName": "B"}))).unwrap();
        db.insert("order", "orderKey", Row::new());
        db.restore(before);

        assert_eq!(db.count("order"), 1);
        assert_eq!(db.get("order", 1).unwrap()["vendorName"], json!("A"));
    }
}
