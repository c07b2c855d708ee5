use data_portal::{ModelSchema, PortalError, PropertyDescriptor, Rules};
use std::sync::Arc;

pub const NAME: &str = "BlanketOrderItem";

/// DAO method loading the items of one order by its `orderKey`.
pub const FETCH_FOR_ORDER: &str = "fetchForOrder";

pub fn schema() -> Result<Arc<ModelSchema>, PortalError> {
    ModelSchema::builder(NAME)
        .property(PropertyDescriptor::integer("orderItemKey").key().read_only())
        .property(PropertyDescriptor::integer("orderKey").parent_key().read_only())
        .property(PropertyDescriptor::text("productName"))
        .property(PropertyDescriptor::boolean("obsolete"))
        .property(PropertyDescriptor::date_time("expiry"))
        .property(PropertyDescriptor::integer("quantity"))
        .property(PropertyDescriptor::decimal("unitPrice"))
        .rules(Rules::new().min_value("quantity", 1.0, "Quantity must be at least 1."))
        .build()
}
