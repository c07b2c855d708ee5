//! # Data Portal Sample
//!
//! Walks one blanket order through its whole lifecycle:
//! 1.  Create an order with an address and two items, save it.
//! 2.  Fetch it back, change an item, remove another, add a third, save.
//! 3.  List orders through the read-only view.
//! 4.  Run the clear-schedule command.
//! 5.  Remove the order, first as a clerk (skipped), then as a manager.
//!
//! ```bash
//! RUST_LOG=info cargo run -p portal-sample
//! RUST_LOG=debug cargo run -p portal-sample    # DAO calls and payloads
//! ```

use data_portal::tracing::setup_tracing;
use data_portal::{Model, PortalError, PortalSettings};
use portal_sample::error::SampleError;
use portal_sample::lifecycle::OrderSystem;
use serde_json::json;
use tracing::{info, warn, Instrument};

async fn add_item(
    order: &mut Model,
    product: &str,
    quantity: i64,
    unit_price: f64,
) -> Result<(), PortalError> {
    let items = order.children_mut("items")?;
    if let Some(item) = items.create_item().await? {
        item.set("productName", json!(product))?;
        item.set("quantity", json!(quantity))?;
        item.set("unitPrice", json!(unit_price))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), SampleError> {
    setup_tracing();

    let settings = PortalSettings::discover()?;
    let system = OrderSystem::with_settings(&settings)?;
    let schemas = &system.schemas;

    // 1. Create
    let order_key = async {
        let mut order = system.portal.create(&schemas.blanket_order).await?;
        order.set("vendorName", json!("Blue Zebra"))?;
        order.set("totalPrice", json!(1250.0))?;
        order.set("schedules", json!(3))?;
        {
            let address = order.child_mut("address")?;
            address.set("address", json!("Fő utca 1."))?;
            address.set("city", json!("Pécs"))?;
            address.set("zipCode", json!("7621"))?;
        }
        add_item(&mut order, "Steel bolt", 500, 0.5).await?;
        add_item(&mut order, "Hex nut", 500, 0.25).await?;

        let outcome = order.save().await?;
        info!(?outcome, key = %order.key(), "Order saved");
        Ok::<_, PortalError>(order.key())
    }
    .instrument(tracing::info_span!("create_order"))
    .await?;

    // 2. Fetch and edit
    async {
        let mut order = system
            .portal
            .fetch(&schemas.blanket_order, json!({ "orderKey": order_key }))
            .await?;
        {
            let items = order.children_mut("items")?;
            if let Some(bolt) = items.get_mut(0) {
                bolt.set("quantity", json!(750))?;
            }
            items.remove_item(1)?;
        }
        add_item(&mut order, "Washer", 1000, 0.1).await?;

        let outcome = order.save().await?;
        info!(?outcome, state = ?order.state(), "Order edited");
        info!(order = %order.to_cto(), "Client view");
        Ok::<_, PortalError>(())
    }
    .instrument(tracing::info_span!("edit_order"))
    .await?;

    // 3. List
    let page = system
        .portal
        .fetch_collection(&schemas.blanket_order_view, json!({ "page": 1 }))
        .await?;
    info!(count = page.len(), total = ?page.total_items(), "Order list fetched");
    let matches = system
        .portal
        .fetch_collection_with(
            &schemas.blanket_order_view,
            "fetchByName",
            json!({ "vendorName": "zebra" }),
        )
        .await?;
    info!(count = matches.len(), "Orders matching 'zebra'");

    // 4. Command
    let command = system
        .portal
        .execute(&schemas.clear_schedule, json!({ "orderKey": order_key }))
        .await?;
    info!(result = ?command.property_value("result"), "Command executed");

    // 5. Remove
    let mut order = system
        .portal
        .fetch(&schemas.blanket_order, json!({ "orderKey": order_key }))
        .await?;
    order.remove()?;
    let outcome = order.save().await?;
    if outcome.is_skipped() {
        warn!(?outcome, user = ?system.current_user(), "Removal skipped");
    }
    system.sign_in(Some("manager"));
    let outcome = order.save().await?;
    info!(?outcome, state = ?order.state(), "Order removed");

    info!(
        open_sessions = system.connections.open_sessions(),
        "Application completed successfully"
    );
    Ok(())
}
