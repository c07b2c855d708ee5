//! # Blanket Order View DAO
//!
//! Read-only projections of the order table for list screens.
//!
//! - `fetch` takes `{ "page": n, "pageSize": m }` (1-based, defaults 1 and
//!   [`DEFAULT_PAGE_SIZE`]) and answers `{ "items": [...], "totalItems": n }`
//! - `fetchByName` takes `{ "vendorName": text }` and answers every order
//!   whose vendor name contains `text`, ignoring case

use crate::dao::{session, ORDER_TABLE};
use crate::model::blanket_order_view::FETCH_BY_NAME;
use crate::storage::{MemoryDatabase, Row};
use async_trait::async_trait;
use data_portal::{Connection, Dao, PortalError};
use serde_json::{json, Map, Value};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

const COLUMNS: [&str; 4] = ["orderKey", "vendorName", "contractDate", "totalPrice"];

#[derive(Debug, Clone)]
pub struct BlanketOrderViewDao {
    db: MemoryDatabase,
}

impl BlanketOrderViewDao {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }

    fn project(row: Row) -> Value {
        let map: Map<String, Value> = COLUMNS
            .iter()
            .map(|column| (column.to_string(), row.get(*column).cloned().unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }

    fn fetch_page(&self, filter: &Value) -> Value {
        let page = filter.get("page").and_then(Value::as_u64).unwrap_or(1).max(1);
        let size = filter
            .get("pageSize")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .max(1);
        let rows = self.db.select(ORDER_TABLE, |_| true);
        let total = rows.len();
        let items: Vec<Value> = rows
            .into_iter()
            .skip(((page - 1) * size) as usize)
            .take(size as usize)
            .map(Self::project)
            .collect();
        json!({ "items": items, "totalItems": total })
    }

    fn fetch_by_name(&self, filter: &Value) -> Value {
        let needle = filter
            .get("vendorName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let rows = self.db.select(ORDER_TABLE, |row| {
            row.get("vendorName")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase().contains(&needle))
        });
        Value::Array(rows.into_iter().map(Self::project).collect())
    }
}

#[async_trait]
impl Dao for BlanketOrderViewDao {
    fn name(&self) -> &str {
        "BlanketOrderViewDao"
    }

    fn has_method(&self, method: &str) -> bool {
        method == "fetch" || method == FETCH_BY_NAME
    }

    async fn call(
        &self,
        method: &str,
        connection: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError> {
        session(connection)?;
        match method {
            "fetch" => Ok(self.fetch_page(&argument)),
            FETCH_BY_NAME => Ok(self.fetch_by_name(&argument)),
            other => Err(PortalError::NoSuchMethod {
                dao: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}
