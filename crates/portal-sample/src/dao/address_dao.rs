use crate::dao::{session, TableAccess, ADDRESS_TABLE};
use crate::storage::MemoryDatabase;
use async_trait::async_trait;
use data_portal::{Connection, Dao, PortalError};
use serde_json::{json, Value};

const METHODS: [&str; 4] = ["create", "insert", "update", "remove"];

/// DAO of the address child. There is no `fetch`: addresses arrive inside
/// the order's fetch result.
#[derive(Debug, Clone)]
pub struct AddressDao {
    table: TableAccess,
}

impl AddressDao {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            table: TableAccess::new(db, ADDRESS_TABLE, "addressKey"),
        }
    }
}

#[async_trait]
impl Dao for AddressDao {
    fn name(&self) -> &str {
        "AddressDao"
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
            "create" => Ok(json!({ "country": "Hungary" })),
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
