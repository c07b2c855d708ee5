//! Delivery address of a blanket order. Loaded from the order's fetch result,
//! saved with its own DAO.

use data_portal::{ModelSchema, PortalError, PropertyDescriptor, Rules};
use std::sync::Arc;

pub const NAME: &str = "Address";

pub fn schema() -> Result<Arc<ModelSchema>, PortalError> {
    ModelSchema::builder(NAME)
        .property(PropertyDescriptor::integer("addressKey").key().read_only())
        .property(PropertyDescriptor::integer("orderKey").parent_key().read_only())
        .property(PropertyDescriptor::text("address"))
        .property(PropertyDescriptor::text("city"))
        .property(PropertyDescriptor::text("zipCode"))
        .property(PropertyDescriptor::text("country"))
        .rules(Rules::new().required("city", "City is required."))
        .build()
}
