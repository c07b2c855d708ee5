//! Read-only list row of blanket orders, for search screens.
//!
//! The view DAO answers `fetch` with one page,
//! `{ "items": [...], "totalItems": n }`, and `fetchByName` with every order
//! whose vendor name contains the given text.

use data_portal::{ModelSchema, PortalError, PropertyDescriptor};
use std::sync::Arc;

pub const NAME: &str = "BlanketOrderView";
pub const FETCH_BY_NAME: &str = "fetchByName";

pub fn schema() -> Result<Arc<ModelSchema>, PortalError> {
    ModelSchema::builder(NAME)
        .read_only()
        .property(PropertyDescriptor::integer("orderKey").key())
        .property(PropertyDescriptor::text("vendorName"))
        .property(PropertyDescriptor::date_time("contractDate"))
        .property(PropertyDescriptor::decimal("totalPrice"))
        .build()
}
