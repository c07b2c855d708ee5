//! Command that resets the schedule counter of one blanket order. Set
//! `orderKey`, execute, read `result`.

use data_portal::{ModelSchema, PortalError, PropertyDescriptor};
use std::sync::Arc;

pub const NAME: &str = "ClearScheduleCommand";

pub fn schema() -> Result<Arc<ModelSchema>, PortalError> {
    ModelSchema::builder(NAME)
        .command()
        .property(PropertyDescriptor::integer("orderKey"))
        .property(PropertyDescriptor::text("result").read_only().not_on_wire_out())
        .build()
}
