//! # Blanket Order DAO
//!
//! `fetch` answers with the order row plus its `address` row, so the address
//! child loads without a DAO call of its own. Items are not included; the
//! item collection fetches itself with `fetchForOrder`.

use crate::dao::{into_row, key_of, now, rows_where, session, TableAccess, ADDRESS_TABLE, ORDER_TABLE};
use crate::storage::MemoryDatabase;
use async_trait::async_trait;
use data_portal::{Connection, Dao, PortalError};
use serde_json::{json, Value};
use tracing::debug;

const METHODS: [&str; 5] = ["create", "fetch", "insert", "update", "remove"];

#[derive(Debug, Clone)]
pub struct BlanketOrderDao {
    table: TableAccess,
}

impl BlanketOrderDao {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            table: TableAccess::new(db, ORDER_TABLE, "orderKey"),
        }
    }

    fn create(&self) -> Value {
        json!({
            "contractDate": now(),
            "totalPrice": 0.0,
            "schedules": 0,
            "enabled": true,
        })
    }

    fn fetch(&self, filter: &Value) -> Result<Value, PortalError> {
        let key = key_of(filter, "orderKey")?;
        let db = self.table.db();
        let Some(mut row) = db.get(ORDER_TABLE, key) else {
            debug!(order_key = key, "Order not in table");
            return Ok(Value::Null);
        };
        if let Some(address) = rows_where(db, ADDRESS_TABLE, "orderKey", key).into_iter().next() {
            row.insert("address".into(), Value::Object(address));
        }
        Ok(Value::Object(row))
    }

    fn insert(&self, dto: Value) -> Result<Value, PortalError> {
        let stamp = now();
        let mut row = into_row(dto)?;
        row.insert("createdDate".into(), stamp.clone());
        row.insert("modifiedDate".into(), stamp.clone());
        let mut returned = self.table.insert(Value::Object(row))?;
        returned["createdDate"] = stamp.clone();
        returned["modifiedDate"] = stamp;
        Ok(returned)
    }

    fn update(&self, dto: Value) -> Result<Value, PortalError> {
        let stamp = now();
        let mut row = into_row(dto)?;
        row.remove("createdDate");
        row.insert("modifiedDate".into(), stamp.clone());
        self.table.update(Value::Object(row))?;
        Ok(json!({ "modifiedDate": stamp }))
    }
}

#[async_trait]
impl Dao for BlanketOrderDao {
    fn name(&self) -> &str {
        "BlanketOrderDao"
    }

    fn has_method(&self, method: &str) -> bool {
        METHODS.contains(&method)
    }

    async fn call(
        &self,
        method: &str,
        connection: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError> {
        session(connection)?;
        match method {
            "create" => Ok(self.create()),
            "fetch" => self.fetch(&argument),
            "insert" => self.insert(argument),
            "update" => self.update(argument),
            "remove" => {
                self.table.remove(&argument)?;
                Ok(Value::Null)
            }
            other => Err(PortalError::NoSuchMethod {
                dao: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}
