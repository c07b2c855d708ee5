//! # Sample Models
//!
//! Registrations of the blanket-order domain. Each submodule exposes the
//! model name and a `schema()` function; [`Schemas`] builds them all once,
//! children first.
//!
//! | Model | Kind | DAO |
//! |-------|------|-----|
//! | `BlanketOrder` | editable root | [`BlanketOrderDao`](crate::dao::BlanketOrderDao) |
//! | `Address` | editable child | [`AddressDao`](crate::dao::AddressDao) |
//! | `BlanketOrderItem` | editable child collection | [`BlanketOrderItemDao`](crate::dao::BlanketOrderItemDao) |
//! | `BlanketOrderView` | read-only list | [`BlanketOrderViewDao`](crate::dao::BlanketOrderViewDao) |
//! | `ClearScheduleCommand` | command | [`ClearScheduleDao`](crate::dao::ClearScheduleDao) |

pub mod address;
pub mod blanket_order;
pub mod blanket_order_item;
pub mod blanket_order_view;
pub mod clear_schedule;

use data_portal::{ModelSchema, PortalError};
use std::sync::Arc;

/// Every schema of the sample domain.
#[derive(Debug, Clone)]
pub struct Schemas {
    pub blanket_order: Arc<ModelSchema>,
    pub address: Arc<ModelSchema>,
    pub blanket_order_item: Arc<ModelSchema>,
    pub blanket_order_view: Arc<ModelSchema>,
    pub clear_schedule: Arc<ModelSchema>,
}

impl Schemas {
    pub fn build() -> Result<Self, PortalError> {
        let address = address::schema()?;
        let blanket_order_item = blanket_order_item::schema()?;
        let blanket_order = blanket_order::schema(address.clone(), blanket_order_item.clone())?;
        Ok(Self {
            blanket_order,
            address,
            blanket_order_item,
            blanket_order_view: blanket_order_view::schema()?,
            clear_schedule: clear_schedule::schema()?,
        })
    }
}
