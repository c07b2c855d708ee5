use crate::dao::{key_of, now, session, ORDER_TABLE};
use crate::error::SampleError;
use crate::storage::MemoryDatabase;
use async_trait::async_trait;
use data_portal::{Connection, Dao, PortalError};
use serde_json::{json, Map, Value};
use tracing::info;

/// Executes [`ClearScheduleCommand`](crate::model::clear_schedule): resets
/// `schedules` of the named order and reports how many were dropped.
#[derive(Debug, Clone)]
pub struct ClearScheduleDao {
    db: MemoryDatabase,
}

impl ClearScheduleDao {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }

    fn execute(&self, argument: &Value) -> Result<Value, SampleError> {
        let key = key_of(argument, "orderKey")?;
        let previous = self
            .db
            .get(ORDER_TABLE, key)
            .ok_or_else(|| SampleError::RowNotFound {
                table: ORDER_TABLE.to_string(),
                key,
            })?
            .get("schedules")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let mut changes = Map::new();
        changes.insert("schedules".into(), json!(0));
        changes.insert("modifiedDate".into(), now());
        self.db.update(ORDER_TABLE, key, changes)?;

        info!(order_key = key, cleared = previous, "Schedules cleared");
        Ok(json!({ "result": format!("Cleared {previous} schedules of order {key}.") }))
    }
}

#[async_trait]
impl Dao for ClearScheduleDao {
    fn name(&self) -> &str {
        "ClearScheduleDao"
    }

    fn has_method(&self, method: &str) -> bool {
        method == "execute"
    }

    async fn call(
        &self,
        method: &str,
        connection: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError> {
        session(connection)?;
        match method {
            "execute" => Ok(self.execute(&argument)?),
            other => Err(PortalError::NoSuchMethod {
                dao: self.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}
