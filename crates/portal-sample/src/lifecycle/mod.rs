//! # System Wiring
//!
//! [`OrderSystem`] is the composition root of the sample. It builds the
//! pieces bottom-up and hands out a ready [`DataPortal`](data_portal::DataPortal):
//!
//! 1. **Storage** - one [`MemoryDatabase`](crate::storage::MemoryDatabase)
//! 2. **DAOs** - one per model type, each holding a clone of the database,
//!    collected in a [`DaoRegistry`](data_portal::DaoRegistry)
//! 3. **Connections** - a [`MemoryConnectionManager`](crate::storage::MemoryConnectionManager)
//!    over the same database
//! 4. **Configuration** - [`PortalConfig`](data_portal::PortalConfig) from
//!    file settings plus the collaborators above
//! 5. **Schemas** - compiled once, children before parents
//!
//! ```rust
//! use portal_sample::lifecycle::OrderSystem;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = OrderSystem::new()?;
//!     let mut order = system.portal.create(&system.schemas.blanket_order).await?;
//!     order.set("vendorName", json!("Blue Zebra"))?;
//!     order.save().await?;
//!     assert_eq!(order.key(), json!(1));
//!     Ok(())
//! }
//! ```
//!
//! The signed-in user starts as `clerk`; [`OrderSystem::sign_in`] switches
//! it. Every rule check reads the current value, so a switch applies to
//! models that already exist.

pub mod order_system;

pub use order_system::*;
