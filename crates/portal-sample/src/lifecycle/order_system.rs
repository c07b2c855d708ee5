use crate::dao::{
    AddressDao, BlanketOrderDao, BlanketOrderItemDao, BlanketOrderViewDao, ClearScheduleDao,
};
use crate::error::SampleError;
use crate::model::{
    address, blanket_order, blanket_order_item, blanket_order_view, clear_schedule, Schemas,
};
use crate::storage::{MemoryConnectionManager, MemoryDatabase};
use data_portal::{DaoRegistry, DataPortal, PortalConfig, PortalSettings};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Data source name of the sample.
pub const DATA_SOURCE: &str = "orders";

/// The wired sample application: database, DAOs, connection manager,
/// portal configuration and schemas.
#[derive(Debug, Clone)]
pub struct OrderSystem {
    pub portal: DataPortal,
    pub schemas: Schemas,
    pub database: MemoryDatabase,
    pub connections: MemoryConnectionManager,
    current_user: Arc<Mutex<Option<String>>>,
}

impl OrderSystem {
    /// A system with default settings on the `orders` data source.
    pub fn new() -> Result<Self, SampleError> {
        let settings = PortalSettings {
            default_data_source: DATA_SOURCE.to_string(),
            ..PortalSettings::default()
        };
        Self::with_settings(&settings)
    }

    pub fn with_settings(settings: &PortalSettings) -> Result<Self, SampleError> {
        let database = MemoryDatabase::new();
        let connections = MemoryConnectionManager::new(database.clone());

        // 1. DAOs share the database
        let registry = DaoRegistry::new()
            .register(blanket_order::NAME, Arc::new(BlanketOrderDao::new(database.clone())))
            .register(address::NAME, Arc::new(AddressDao::new(database.clone())))
            .register(
                blanket_order_item::NAME,
                Arc::new(BlanketOrderItemDao::new(database.clone())),
            )
            .register(
                blanket_order_view::NAME,
                Arc::new(BlanketOrderViewDao::new(database.clone())),
            )
            .register(clear_schedule::NAME, Arc::new(ClearScheduleDao::new(database.clone())));

        // 2. The user reader looks at the signed-in user on every check
        let current_user = Arc::new(Mutex::new(Some("clerk".to_string())));
        let reader = current_user.clone();
        let config = PortalConfig::builder()
            .settings(settings)
            .connection_manager(Arc::new(connections.clone()))
            .dao_builder(Arc::new(registry))
            .user_reader(move || reader.lock().unwrap_or_else(|p| p.into_inner()).clone())
            .build()?;

        // 3. Schemas are compiled once
        let schemas = Schemas::build()?;

        info!(
            data_source = %config.default_data_source(),
            no_access = ?config.no_access_behavior(),
            "Order system ready"
        );
        Ok(Self {
            portal: DataPortal::new(config),
            schemas,
            database,
            connections,
            current_user,
        })
    }

    /// Switches the user seen by authorization rules. `None` signs out.
    pub fn sign_in(&self, user: Option<&str>) {
        let mut current = self.current_user.lock().unwrap_or_else(|p| p.into_inner());
        *current = user.map(str::to_string);
        info!(user = ?user, "Signed in");
    }

    pub fn current_user(&self) -> Option<String> {
        self.current_user.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
