use crate::dao::{key_of, rows_where, session, TableAccess, ITEM_TABLE};
use crate::model::blanket_order_item::FETCH_FOR_ORDER;
use crate::storage::MemoryDatabase;
use async_trait::async_trait;
use data_portal::{Connection, Dao, PortalError};
use serde_json::{json, Value};

const METHODS: [&str; 5] = ["create", FETCH_FOR_ORDER, "insert", "update", "remove"];

#[derive(Debug, Clone)]
pub struct BlanketOrderItemDao {
    table: TableAccess,
}

impl BlanketOrderItemDao {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            table: TableAccess::new(db, ITEM_TABLE, "orderItemKey"),
        }
    }

    /// Items of one order, in insertion order.
    fn fetch_for_order(&self, filter: &Value) -> Result<Value, PortalError> {
        let order_key = key_of(filter, "orderKey")?;
        let rows = rows_where(self.table.db(), ITEM_TABLE, "orderKey", order_key);
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

#[async_trait]
impl Dao for BlanketOrderItemDao {
    fn name(&self) -> &str {
        "BlanketOrderItemDao"
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
            "create" => Ok(json!({ "quantity": 1, "obsolete": false })),
            FETCH_FOR_ORDER => self.fetch_for_order(&argument),
            "insert" => Ok(self.table.insert(argument)?),
            "update" => {
                self.table.update(argument)?;
                Ok(Value::Null)
            }
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
