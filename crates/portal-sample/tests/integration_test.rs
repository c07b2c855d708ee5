use data_portal::{Model, ModelState, Outcome, PortalError, PortalOperation, SkipReason};
use portal_sample::dao::{ADDRESS_TABLE, ITEM_TABLE, ORDER_TABLE};
use portal_sample::lifecycle::OrderSystem;
use portal_sample::storage::Row;
use serde_json::{json, Value};

// --- Helpers ---

async fn add_item(order: &mut Model, product: &str, quantity: i64) {
    let items = order.children_mut("items").unwrap();
    let item = items.create_item().await.unwrap().expect("item create skipped");
    item.set("productName", json!(product)).unwrap();
    item.set("quantity", json!(quantity)).unwrap();
}

/// Saves an order with an address and two items, returns its key.
async fn seed_order(system: &OrderSystem, vendor: &str) -> i64 {
    let mut order = system
        .portal
        .create(&system.schemas.blanket_order)
        .await
        .expect("Failed to create order");
    order.set("vendorName", json!(vendor)).unwrap();
    order.set("schedules", json!(4)).unwrap();
    order
        .child_mut("address")
        .unwrap()
        .set("city", json!("Pécs"))
        .unwrap();
    add_item(&mut order, "Steel bolt", 500).await;
    add_item(&mut order, "Hex nut", 200).await;

    assert_eq!(order.save().await.unwrap(), Outcome::Inserted);
    order.key().as_i64().expect("generated key")
}

fn items_of(system: &OrderSystem, order_key: i64) -> Vec<Row> {
    system
        .database
        .select(ITEM_TABLE, |row| row.get("orderKey") == Some(&json!(order_key)))
}

// --- Tests ---

#[tokio::test]
async fn test_create_and_save_blanket_order() {
    let system = OrderSystem::new().unwrap();

    // 1. Create: defaults come from the DAO
    let mut order = system.portal.create(&system.schemas.blanket_order).await.unwrap();
    assert_eq!(order.state(), Some(ModelState::Created));
    assert_eq!(order.get("enabled"), Some(&json!(true)));
    assert_eq!(
        order.child("address").unwrap().get("country"),
        Some(&json!("Hungary"))
    );

    // 2. Set and save
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    order
        .child_mut("address")
        .unwrap()
        .set("city", json!("Szeged"))
        .unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Inserted);

    // 3. One row per model, keys generated and copied down
    assert_eq!(order.state(), Some(ModelState::Pristine));
    assert_eq!(order.key(), json!(1));
    assert!(order.get("createdDate").unwrap().is_string());
    assert_eq!(system.database.count(ORDER_TABLE), 1);
    let address = system.database.get(ADDRESS_TABLE, 1).unwrap();
    assert_eq!(address["orderKey"], json!(1));
    assert_eq!(address["city"], json!("Szeged"));
    assert_eq!(system.connections.open_sessions(), 0);
}

#[tokio::test]
async fn test_fetch_unknown_order_fails_with_not_found() {
    let system = OrderSystem::new().unwrap();
    let mut order = system.portal.instance(&system.schemas.blanket_order);

    let err = order.fetch(json!({"orderKey": 999})).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(
        err,
        PortalError::DataPortal { operation: PortalOperation::Fetch, ref model, .. } if model == "BlanketOrder"
    ));
    assert_eq!(order.state(), None);
    assert_eq!(system.connections.open_sessions(), 0);
}

#[tokio::test]
async fn test_fetch_loads_address_and_items() {
    let system = OrderSystem::new().unwrap();
    let key = seed_order(&system, "Blue Zebra").await;

    let order = system
        .portal
        .fetch(&system.schemas.blanket_order, json!({"orderKey": key}))
        .await
        .unwrap();

    assert_eq!(order.state(), Some(ModelState::Pristine));
    assert_eq!(order.child("address").unwrap().get("city"), Some(&json!("Pécs")));
    let items = order.children("items").unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items.get(1).unwrap().get("productName"), Some(&json!("Hex nut")));
    assert!(items.iter().all(|i| i.state() == Some(ModelState::Pristine)));
}

#[tokio::test]
async fn test_item_removal_and_sibling_changes_in_one_save() {
    let system = OrderSystem::new().unwrap();
    let key = seed_order(&system, "Blue Zebra").await;
    let mut order = system
        .portal
        .fetch(&system.schemas.blanket_order, json!({"orderKey": key}))
        .await
        .unwrap();

    // Remove the bolt, change the nut, add a washer
    {
        let items = order.children_mut("items").unwrap();
        items.remove_item(0).unwrap();
        items.get_mut(1).unwrap().set("quantity", json!(300)).unwrap();
    }
    add_item(&mut order, "Washer", 1000).await;
    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    let items = order.children("items").unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.state() == Some(ModelState::Pristine)));

    let stored = items_of(&system, key);
    let names: Vec<&Value> = stored.iter().map(|row| &row["productName"]).collect();
    assert_eq!(names, [&json!("Hex nut"), &json!("Washer")]);
    assert_eq!(stored[0]["quantity"], json!(300));
}

#[tokio::test]
async fn test_child_only_change_keeps_order_row() {
    let system = OrderSystem::new().unwrap();
    let key = seed_order(&system, "Blue Zebra").await;
    let modified = system.database.get(ORDER_TABLE, key).unwrap()["modifiedDate"].clone();

    let mut order = system
        .portal
        .fetch(&system.schemas.blanket_order, json!({"orderKey": key}))
        .await
        .unwrap();
    order
        .children_mut("items")
        .unwrap()
        .get_mut(0)
        .unwrap()
        .set("quantity", json!(9))
        .unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    order
        .child_mut("address")
        .unwrap()
        .set("city", json!("Győr"))
        .unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    // The order row itself was never rewritten
    let row = system.database.get(ORDER_TABLE, key).unwrap();
    assert_eq!(row["modifiedDate"], modified);
    assert_eq!(items_of(&system, key)[0]["quantity"], json!(9));
    assert_eq!(system.database.get(ADDRESS_TABLE, 1).unwrap()["city"], json!("Győr"));
}

#[tokio::test]
async fn test_invalid_order_is_not_saved() {
    let system = OrderSystem::new().unwrap();
    let mut order = system.portal.create(&system.schemas.blanket_order).await.unwrap();
    order.set("vendorName", json!("x".repeat(51))).unwrap();

    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::Invalid)
    );
    assert_eq!(order.broken_rules().for_property("vendorName").len(), 1);
    assert_eq!(system.database.count(ORDER_TABLE), 0);
}

#[tokio::test]
async fn test_invalid_item_is_skipped_while_order_saves() {
    let system = OrderSystem::new().unwrap();
    let mut order = system.portal.create(&system.schemas.blanket_order).await.unwrap();
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    add_item(&mut order, "Broken bolt", 0).await;

    assert_eq!(order.save().await.unwrap(), Outcome::Inserted);
    let item = order.children("items").unwrap().get(0).unwrap();
    assert_eq!(item.state(), Some(ModelState::Created));
    assert!(!item.broken_rules().is_empty());
    assert_eq!(system.database.count(ITEM_TABLE), 0);
}

#[tokio::test]
async fn test_failed_save_rolls_back_the_transaction() {
    let system = OrderSystem::new().unwrap();
    let key = seed_order(&system, "Blue Zebra").await;
    let mut order = system
        .portal
        .fetch(&system.schemas.blanket_order, json!({"orderKey": key}))
        .await
        .unwrap();

    // Another writer deletes the nut behind the model's back
    system.database.delete(ITEM_TABLE, 2).unwrap();

    order.set("vendorName", json!("Red Panda")).unwrap();
    order
        .children_mut("items")
        .unwrap()
        .get_mut(1)
        .unwrap()
        .set("quantity", json!(1))
        .unwrap();
    let err = order.save().await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.operation(), Some(PortalOperation::Update));
    assert_eq!(order.state(), Some(ModelState::Changed));
    let row = system.database.get(ORDER_TABLE, key).unwrap();
    assert_eq!(row["vendorName"], json!("Blue Zebra"));
    assert_eq!(system.connections.open_sessions(), 0);
}

#[tokio::test]
async fn test_order_removal_requires_manager() {
    let system = OrderSystem::new().unwrap();
    let key = seed_order(&system, "Blue Zebra").await;
    let mut order = system
        .portal
        .fetch(&system.schemas.blanket_order, json!({"orderKey": key}))
        .await
        .unwrap();

    order.remove().unwrap();
    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::Unauthorized)
    );
    assert_eq!(system.database.count(ORDER_TABLE), 1);

    system.sign_in(Some("manager"));
    assert_eq!(order.save().await.unwrap(), Outcome::Removed);
    assert_eq!(order.state(), Some(ModelState::Removed));
    assert_eq!(system.database.count(ORDER_TABLE), 0);
    assert_eq!(system.database.count(ADDRESS_TABLE), 0);
    assert!(items_of(&system, key).is_empty());
}

#[tokio::test]
async fn test_order_view_paging_and_search() {
    let system = OrderSystem::new().unwrap();
    for vendor in ["Blue Zebra", "Red Panda", "Zebra Tools"] {
        seed_order(&system, vendor).await;
    }
    let view = &system.schemas.blanket_order_view;

    let page = system
        .portal
        .fetch_collection(view, json!({"page": 2, "pageSize": 2}))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.total_items(), Some(3));
    assert_eq!(page.get(0).unwrap().get("vendorName"), Some(&json!("Zebra Tools")));

    let found = system
        .portal
        .fetch_collection_with(view, "fetchByName", json!({"vendorName": "zebra"}))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    // Rows of a read-only list cannot be edited
    let mut rows = found;
    let row = rows.get_mut(0).unwrap();
    assert!(matches!(
        row.set("vendorName", json!("x")),
        Err(PortalError::ReadOnlyModel(_))
    ));
}

#[tokio::test]
async fn test_clear_schedule_command() {
    let system = OrderSystem::new().unwrap();
    let key = seed_order(&system, "Blue Zebra").await;

    let command = system
        .portal
        .execute(&system.schemas.clear_schedule, json!({"orderKey": key}))
        .await
        .unwrap();

    assert_eq!(
        command.property_value("result"),
        Some(&json!(format!("Cleared 4 schedules of order {key}.")))
    );
    assert_eq!(
        system.database.get(ORDER_TABLE, key).unwrap()["schedules"],
        json!(0)
    );

    let err = system
        .portal
        .execute(&system.schemas.clear_schedule, json!({"orderKey": 404}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
