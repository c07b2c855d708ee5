//! Root editable model of the sample: a framework contract with one vendor.
//!
//! # Properties
//! - `orderKey` - generated by the DAO on insert
//! - `vendorName` - required, at most 50 characters
//! - `contractDate`, `totalPrice`, `schedules`, `enabled`
//! - `createdDate`, `modifiedDate` - maintained by the DAO
//! - `address` - single [`Address`](super::address) child
//! - `items` - [`BlanketOrderItem`](super::blanket_order_item) collection,
//!   loaded with the item DAO's `fetchForOrder`
//!
//! Only a `manager` may remove an order.

use crate::model::blanket_order_item::FETCH_FOR_ORDER;
use data_portal::{AuthorizationAction, ModelSchema, PortalError, PropertyDescriptor, Rules};
use std::sync::Arc;

pub const NAME: &str = "BlanketOrder";
pub const VENDOR_NAME_MAX: usize = 50;

pub fn schema(
    address: Arc<ModelSchema>,
    item: Arc<ModelSchema>,
) -> Result<Arc<ModelSchema>, PortalError> {
    ModelSchema::builder(NAME)
        .property(PropertyDescriptor::integer("orderKey").key().read_only())
        .property(PropertyDescriptor::text("vendorName"))
        .property(PropertyDescriptor::date_time("contractDate"))
        .property(PropertyDescriptor::decimal("totalPrice"))
        .property(PropertyDescriptor::integer("schedules"))
        .property(PropertyDescriptor::boolean("enabled"))
        .property(PropertyDescriptor::date_time("createdDate").read_only())
        .property(PropertyDescriptor::date_time("modifiedDate").read_only())
        .property(PropertyDescriptor::child("address", address))
        .property(PropertyDescriptor::children_fetched_by(
            "items",
            item,
            FETCH_FOR_ORDER,
        ))
        .rules(
            Rules::new()
                .required("vendorName", "Vendor name is required.")
                .max_length(
                    "vendorName",
                    VENDOR_NAME_MAX,
                    format!("Vendor name must be at most {VENDOR_NAME_MAX} characters."),
                )
                .allow_users(AuthorizationAction::RemoveObject, ["manager"]),
        )
        .build()
}
