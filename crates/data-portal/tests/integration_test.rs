use async_trait::async_trait;
use data_portal::mock::{ConnectionEvent, MockDao, RecordingConnectionManager};
use data_portal::{
    AuthorizationAction, Connection, Dao, DaoRegistry, DataHook, DataPortal, DataPortalContext,
    ExtensionSet, ModelSchema, ModelState, NoAccessBehavior, Outcome, PortalConfig, PortalError,
    PortalOperation, PropertyDescriptor, Rules, SkipReason,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- Test Schemas ---

fn line_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("Line")
        .property(PropertyDescriptor::integer("lineKey").key().read_only())
        .property(PropertyDescriptor::integer("orderKey").parent_key().read_only())
        .property(PropertyDescriptor::text("productName"))
        .property(PropertyDescriptor::integer("quantity"))
        .rules(Rules::new().min_value("quantity", 1.0, "Quantity must be at least 1."))
        .build()
        .unwrap()
}

fn address_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("Address")
        .property(PropertyDescriptor::integer("addressKey").key().read_only())
        .property(PropertyDescriptor::integer("orderKey").parent_key().read_only())
        .property(PropertyDescriptor::text("city"))
        .build()
        .unwrap()
}

fn order_schema(rules: Rules) -> Arc<ModelSchema> {
    ModelSchema::builder("Order")
        .property(PropertyDescriptor::integer("orderKey").key().read_only())
        .property(PropertyDescriptor::text("vendorName"))
        .property(PropertyDescriptor::child("address", address_schema()))
        .property(PropertyDescriptor::children_fetched_by(
            "lines",
            line_schema(),
            "fetchForOrder",
        ))
        .rules(rules.required("vendorName", "Vendor name is required."))
        .build()
        .unwrap()
}

struct Harness {
    portal: DataPortal,
    connections: RecordingConnectionManager,
    order_dao: MockDao,
    address_dao: MockDao,
    line_dao: MockDao,
}

fn harness(behavior: NoAccessBehavior) -> Harness {
    let order_dao = MockDao::new("OrderDao");
    let address_dao = MockDao::new("AddressDao");
    let line_dao = MockDao::new("LineDao");
    harness_with(behavior, order_dao, address_dao, Arc::new(line_dao.clone()), line_dao)
}

fn harness_with(
    behavior: NoAccessBehavior,
    order_dao: MockDao,
    address_dao: MockDao,
    line: Arc<dyn Dao>,
    line_dao: MockDao,
) -> Harness {
    let connections = RecordingConnectionManager::new();
    let registry = DaoRegistry::new()
        .register("Order", Arc::new(order_dao.clone()))
        .register("Address", Arc::new(address_dao.clone()))
        .register("Line", line);
    let config = PortalConfig::builder()
        .connection_manager(Arc::new(connections.clone()))
        .dao_builder(Arc::new(registry))
        .no_access_behavior(behavior)
        .user_reader(|| Some("ada".to_string()))
        .build()
        .unwrap();
    Harness {
        portal: DataPortal::new(config),
        connections,
        order_dao,
        address_dao,
        line_dao,
    }
}

fn stored_order() -> Value {
    json!({
        "orderKey": 1,
        "vendorName": "Blue Zebra",
        "address": { "addressKey": 10, "orderKey": 1, "city": "Pécs" }
    })
}

fn stored_lines() -> Value {
    json!([
        { "lineKey": 100, "orderKey": 1, "productName": "Bolt", "quantity": 5 },
        { "lineKey": 101, "orderKey": 1, "productName": "Nut", "quantity": 8 }
    ])
}

fn counter_handler(key: &'static str, start: u64) -> impl Fn(Value) -> Result<Value, PortalError> {
    let next = AtomicU64::new(start);
    move |_| Ok(json!({ key: next.fetch_add(1, Ordering::SeqCst) }))
}

// --- Tests ---

#[tokio::test]
async fn test_create_and_insert_cascades_parent_keys() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.expect("insert").return_ok(json!({"orderKey": 42}));
    h.address_dao.on("insert", counter_handler("addressKey", 10));
    h.line_dao.on("insert", counter_handler("lineKey", 100));
    let schema = order_schema(Rules::new());

    // 1. Create: order, address and an empty line collection
    let mut order = h.portal.create(&schema).await.unwrap();
    assert_eq!(order.state(), Some(ModelState::Created));
    assert_eq!(order.child("address").unwrap().state(), Some(ModelState::Created));
    assert!(order.children("lines").unwrap().is_empty());

    // 2. Add three lines
    for name in ["Bolt", "Nut", "Washer"] {
        let lines = order.children_mut("lines").unwrap();
        let line = lines.create_item().await.unwrap().unwrap();
        line.set("productName", json!(name)).unwrap();
    }
    order.set("vendorName", json!("Blue Zebra")).unwrap();

    // 3. Save: one order insert, one address insert, three line inserts
    assert_eq!(order.save().await.unwrap(), Outcome::Inserted);
    assert_eq!(order.state(), Some(ModelState::Pristine));
    assert_eq!(order.key(), json!(42));
    assert_eq!(h.order_dao.call_count("insert"), 1);
    assert_eq!(h.address_dao.call_count("insert"), 1);
    assert_eq!(h.line_dao.call_count("insert"), 3);

    // Children received the generated parent key
    for call in h.line_dao.calls() {
        assert_eq!(call.argument["orderKey"], json!(42));
    }
    let lines = order.children("lines").unwrap();
    assert!(lines.iter().all(|l| l.state() == Some(ModelState::Pristine)));
    assert_eq!(lines.get(2).unwrap().key(), json!(102));
    assert_eq!(order.child("address").unwrap().key(), json!(10));

    // The whole save ran in one transaction
    let events = h.connections.events();
    assert_eq!(events.last(), Some(&ConnectionEvent::Commit("default".into())));
    assert_eq!(
        events.iter().filter(|e| matches!(e, ConnectionEvent::Begin(_))).count(),
        1
    );
    h.order_dao.verify();
}

#[tokio::test]
async fn test_save_dispatches_by_state() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.order_dao.returning("update", Value::Null);
    h.order_dao.returning("remove", Value::Null);
    h.address_dao.returning("remove", Value::Null);
    h.line_dao.returning("fetchForOrder", stored_lines());
    h.line_dao.returning("remove", Value::Null);
    let schema = order_schema(Rules::new());

    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    assert_eq!(order.state(), Some(ModelState::Pristine));
    assert_eq!(order.children("lines").unwrap().len(), 2);

    // pristine: nothing to do
    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::NothingToSave)
    );

    // changed: update
    order.set("vendorName", json!("Red Panda")).unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    // marked for removal: children first, then the order
    order.remove().unwrap();
    assert_eq!(
        order.child("address").unwrap().state(),
        Some(ModelState::MarkedForRemoval)
    );
    assert_eq!(order.save().await.unwrap(), Outcome::Removed);
    assert_eq!(order.state(), Some(ModelState::Removed));

    assert_eq!(h.order_dao.methods_called(), ["fetch", "update", "remove"]);
    // remove receives the bare key
    assert_eq!(h.order_dao.calls()[2].argument, json!(1));
    let removed: Vec<Value> = h
        .line_dao
        .calls()
        .into_iter()
        .filter(|c| c.method == "remove")
        .map(|c| c.argument)
        .collect();
    assert_eq!(removed, [json!(100), json!(101)]);
    assert_eq!(h.address_dao.call_count("remove"), 1);
    assert!(order.children("lines").unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_unknown_key_is_not_found() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.expect("fetch").return_ok(Value::Null);
    let schema = order_schema(Rules::new());

    let mut order = h.portal.instance(&schema);
    let err = order.fetch(json!({"orderKey": 999})).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.operation(), Some(PortalOperation::Fetch));
    assert_eq!(order.state(), None);
    assert_eq!(
        h.connections.events(),
        [
            ConnectionEvent::Open("default".into()),
            ConnectionEvent::Close("default".into())
        ]
    );
}

#[tokio::test]
async fn test_removals_precede_sibling_writes() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", stored_lines());
    h.line_dao.returning("remove", Value::Null);
    h.line_dao.returning("update", Value::Null);
    h.line_dao.on("insert", counter_handler("lineKey", 200));
    let schema = order_schema(Rules::new());

    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    {
        let lines = order.children_mut("lines").unwrap();
        let added = lines.create_item().await.unwrap().unwrap();
        added.set("productName", json!("Washer")).unwrap();
        lines.get_mut(1).unwrap().set("quantity", json!(9)).unwrap();
        lines.remove_item(0).unwrap();
    }
    assert_eq!(order.state(), Some(ModelState::Changed));
    assert!(!order.is_self_dirty());

    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    let methods = h.line_dao.methods_called();
    assert_eq!(methods[0], "fetchForOrder");
    assert_eq!(methods[1], "remove");
    assert_eq!(methods.len(), 4);
    assert!(methods[2..].contains(&"insert".to_string()));
    assert!(methods[2..].contains(&"update".to_string()));

    // The removed line is gone, the new one got a key
    let lines = order.children("lines").unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines.get(1).unwrap().key(), json!(200));
    assert_eq!(h.order_dao.call_count("update"), 0);
}

#[tokio::test]
async fn test_child_only_changes_skip_parent_update() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", stored_lines());
    h.line_dao.returning("update", Value::Null);
    h.address_dao.returning("update", Value::Null);
    let schema = order_schema(Rules::new());
    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();

    // 1. First update comes from a line
    let line = order.children_mut("lines").unwrap().get_mut(0).unwrap();
    line.set("quantity", json!(6)).unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    // 2. Second update comes from the address
    order
        .child_mut("address")
        .unwrap()
        .set("city", json!("Szeged"))
        .unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Updated);

    assert_eq!(h.order_dao.call_count("update"), 0);
    assert_eq!(h.line_dao.call_count("update"), 1);
    assert_eq!(h.address_dao.call_count("update"), 1);
    assert_eq!(order.state(), Some(ModelState::Pristine));
}

struct SlowLineDao {
    finished: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Dao for SlowLineDao {
    fn name(&self) -> &str {
        "SlowLineDao"
    }

    fn has_method(&self, method: &str) -> bool {
        method == "insert"
    }

    async fn call(&self, _: &str, _: &Connection, argument: Value) -> Result<Value, PortalError> {
        let product = argument["productName"].as_str().unwrap_or_default().to_string();
        if product == "broken" {
            return Err(PortalError::Storage("disk full".into()));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.finished.lock().unwrap().push(product);
        Ok(json!({"lineKey": 1}))
    }
}

#[tokio::test]
async fn test_failing_child_waits_for_siblings_and_rolls_back() {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let order_dao = MockDao::new("OrderDao");
    order_dao.returning("insert", json!({"orderKey": 5}));
    let address_dao = MockDao::new("AddressDao");
    address_dao.returning("insert", json!({"addressKey": 1}));
    let slow = Arc::new(SlowLineDao {
        finished: finished.clone(),
    });
    let h = harness_with(
        NoAccessBehavior::Skip,
        order_dao,
        address_dao,
        slow,
        MockDao::new("unused"),
    );
    let schema = order_schema(Rules::new());

    let mut order = h.portal.create(&schema).await.unwrap();
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    for name in ["slow-a", "broken", "slow-b"] {
        let lines = order.children_mut("lines").unwrap();
        let line = lines.create_item().await.unwrap().unwrap();
        line.set("productName", json!(name)).unwrap();
    }

    let err = order.save().await.unwrap_err();

    match &err {
        PortalError::DataPortal {
            operation, model, ..
        } => {
            assert_eq!(*operation, PortalOperation::Insert);
            assert_eq!(model, "Line");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), PortalError::Storage(msg) if msg == "disk full"));
    assert_eq!(finished.lock().unwrap().len(), 2);
    assert_eq!(order.state(), Some(ModelState::Created));
    assert_eq!(
        h.connections.events().last(),
        Some(&ConnectionEvent::Rollback("default".into()))
    );
}

#[tokio::test]
async fn test_retry_after_rollback_writes_every_row() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.on("insert", counter_handler("orderKey", 1));
    h.address_dao.on("insert", counter_handler("addressKey", 10));
    h.line_dao.expect("insert").return_ok(json!({"lineKey": 100}));
    h.line_dao
        .expect("insert")
        .return_err(PortalError::Storage("disk full".into()));
    h.line_dao.on("insert", counter_handler("lineKey", 200));
    let schema = order_schema(Rules::new());

    let mut order = h.portal.create(&schema).await.unwrap();
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    for name in ["Bolt", "Nut"] {
        let lines = order.children_mut("lines").unwrap();
        let line = lines.create_item().await.unwrap().unwrap();
        line.set("productName", json!(name)).unwrap();
    }

    // 1. Second line fails: the whole tree is back to unsaved
    let err = order.save().await.unwrap_err();
    assert!(matches!(err.root_cause(), PortalError::Storage(_)));
    assert_eq!(order.state(), Some(ModelState::Created));
    assert_eq!(order.key(), Value::Null);
    let address = order.child("address").unwrap();
    assert_eq!(address.state(), Some(ModelState::Created));
    assert_eq!(address.key(), Value::Null);
    let lines = order.children("lines").unwrap();
    assert!(lines.iter().all(|l| l.state() == Some(ModelState::Created)));
    assert_eq!(lines.get(0).unwrap().key(), Value::Null);
    assert_eq!(lines.get(0).unwrap().property_value("orderKey"), Some(&Value::Null));

    // 2. Retry inserts every row again
    assert_eq!(order.save().await.unwrap(), Outcome::Inserted);
    assert_eq!(h.order_dao.call_count("insert"), 2);
    assert_eq!(h.address_dao.call_count("insert"), 2);
    assert_eq!(h.line_dao.call_count("insert"), 4);
    for call in &h.line_dao.calls()[2..] {
        assert_eq!(call.argument["orderKey"], json!(2));
    }
    let lines = order.children("lines").unwrap();
    assert_eq!(lines.get(0).unwrap().key(), json!(200));
    assert_eq!(lines.get(1).unwrap().key(), json!(201));
    assert!(lines.iter().all(|l| l.state() == Some(ModelState::Pristine)));
    assert_eq!(
        h.connections.events().last(),
        Some(&ConnectionEvent::Commit("default".into()))
    );
    h.line_dao.verify();
}

#[tokio::test]
async fn test_invalid_model_marked_for_removal_is_not_removed() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning(
        "fetch",
        json!({ "orderKey": 1, "vendorName": "", "address": null }),
    );
    h.order_dao.returning("remove", Value::Null);
    h.line_dao.returning("fetchForOrder", json!([]));
    let schema = order_schema(Rules::new());

    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    assert!(!order.is_valid());
    order.remove().unwrap();

    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::Invalid)
    );
    assert_eq!(order.state(), Some(ModelState::MarkedForRemoval));
    assert_eq!(h.order_dao.call_count("remove"), 0);
}

#[tokio::test]
async fn test_malformed_child_list_is_wrapped_by_parent_fetch() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning(
        "fetch",
        json!({ "orderKey": 1, "vendorName": "Blue Zebra", "lines": "not a list" }),
    );
    let schema = order_schema(Rules::new());

    let mut order = h.portal.instance(&schema);
    let err = order.fetch(json!({"orderKey": 1})).await.unwrap_err();

    match &err {
        PortalError::DataPortal {
            operation,
            model,
            method,
            ..
        } => {
            assert_eq!(*operation, PortalOperation::Fetch);
            assert_eq!(model, "Order");
            assert_eq!(method, "fetch");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), PortalError::TypeMismatch { .. }));
    assert_eq!(order.state(), None);
}

#[tokio::test]
async fn test_dto_round_trip_on_pristine_instance() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", json!([]));
    let schema = order_schema(Rules::new());

    let order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    let dto = order.to_dto();
    assert_eq!(dto, json!({"orderKey": 1, "vendorName": "Blue Zebra"}));

    let mut copy = h.portal.instance(&schema);
    copy.from_dto(&dto).unwrap();
    assert_eq!(copy.to_dto(), dto);
    assert_eq!(copy.state(), None);

    let cto = order.to_cto();
    assert_eq!(cto["address"]["city"], json!("Pécs"));
    assert_eq!(cto["lines"], json!([]));
}

#[tokio::test]
async fn test_update_denied_is_skipped() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", json!([]));
    let schema = order_schema(Rules::new().deny(AuthorizationAction::UpdateObject));

    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    order.set("vendorName", json!("Red Panda")).unwrap();

    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::Unauthorized)
    );
    assert_eq!(order.state(), Some(ModelState::Changed));
    assert_eq!(h.order_dao.call_count("update"), 0);
    assert!(!h
        .connections
        .events()
        .iter()
        .any(|e| matches!(e, ConnectionEvent::Begin(_))));
}

#[tokio::test]
async fn test_update_denied_raises_when_configured() {
    let h = harness(NoAccessBehavior::Raise);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", json!([]));
    let schema = order_schema(Rules::new().allow_users(AuthorizationAction::UpdateObject, ["bob"]));

    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    order.set("vendorName", json!("Red Panda")).unwrap();

    let err = order.save().await.unwrap_err();
    assert!(matches!(err, PortalError::AccessDenied { ref model, .. } if model == "Order"));
    assert_eq!(order.state(), Some(ModelState::Changed));
}

#[tokio::test]
async fn test_denied_property_access() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", json!([]));
    let schema = order_schema(
        Rules::new()
            .deny(AuthorizationAction::ReadProperty("vendorName".into()))
            .deny(AuthorizationAction::WriteProperty("vendorName".into())),
    );

    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();
    assert_eq!(order.get("vendorName"), None);
    assert_eq!(order.property_value("vendorName"), Some(&json!("Blue Zebra")));

    // Denied write is a silent no-op
    order.set("vendorName", json!("Red Panda")).unwrap();
    assert_eq!(order.state(), Some(ModelState::Pristine));
    assert!(!order.can_write("vendorName"));
}

#[tokio::test]
async fn test_invalid_model_is_not_saved() {
    let h = harness(NoAccessBehavior::Skip);
    let schema = order_schema(Rules::new());

    let mut order = h.portal.create(&schema).await.unwrap();
    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::Invalid)
    );
    assert_eq!(
        order.broken_rules().for_property("vendorName")[0].message,
        "Vendor name is required."
    );
    assert_eq!(h.order_dao.call_count("insert"), 0);

    // Fixing the value clears the broken rule on the next check
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    assert!(order.is_valid());
}

#[tokio::test]
async fn test_checked_writes_reject_bad_input() {
    let h = harness(NoAccessBehavior::Skip);
    let schema = order_schema(Rules::new());
    let mut order = h.portal.create(&schema).await.unwrap();

    assert!(matches!(
        order.set("orderKey", json!(5)),
        Err(PortalError::ReadOnlyProperty(_))
    ));
    assert!(matches!(
        order.set("vendorName", json!(12)),
        Err(PortalError::TypeMismatch { .. })
    ));
    assert!(matches!(
        order.set("address", json!({})),
        Err(PortalError::ChildProperty(_))
    ));
    assert!(matches!(
        order.set("missing", json!(1)),
        Err(PortalError::UnknownProperty { .. })
    ));

    // Uninitialized models cannot change
    let mut fresh = h.portal.instance(&schema);
    assert!(matches!(
        fresh.set("vendorName", json!("x")),
        Err(PortalError::Transition(_))
    ));
    assert_eq!(fresh.property_value("vendorName"), Some(&Value::Null));
}

#[tokio::test]
async fn test_created_then_removed_never_reaches_storage() {
    let h = harness(NoAccessBehavior::Skip);
    let schema = order_schema(Rules::new());

    let mut order = h.portal.create(&schema).await.unwrap();
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    order.remove().unwrap();

    assert_eq!(order.state(), Some(ModelState::Removed));
    assert_eq!(order.child("address").unwrap().state(), Some(ModelState::Removed));
    assert_eq!(
        order.save().await.unwrap(),
        Outcome::Skipped(SkipReason::NothingToSave)
    );
    assert!(h.order_dao.calls().is_empty());
}

struct AuditedInsert;

#[async_trait]
impl DataHook for AuditedInsert {
    async fn run(
        &self,
        ctx: &mut DataPortalContext<'_>,
        argument: Value,
    ) -> Result<Value, PortalError> {
        let mut dto = argument;
        dto["insertedBy"] = json!(ctx.user());
        let returned = ctx.call("insert", dto).await?;
        ctx.set_value("orderKey", returned["orderKey"].clone())?;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn test_insert_hook_replaces_dao_call() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.expect("insert").return_ok(json!({"orderKey": 77}));
    let schema = ModelSchema::builder("Order")
        .property(PropertyDescriptor::integer("orderKey").key().read_only())
        .property(PropertyDescriptor::text("vendorName"))
        .extensions(ExtensionSet::new().data_insert(Arc::new(AuditedInsert)))
        .build()
        .unwrap();

    let mut order = h.portal.create(&schema).await.unwrap();
    order.set("vendorName", json!("Blue Zebra")).unwrap();
    assert_eq!(order.save().await.unwrap(), Outcome::Inserted);

    assert_eq!(order.key(), json!(77));
    assert_eq!(h.order_dao.calls()[0].argument["insertedBy"], json!("ada"));
    h.order_dao.verify();
}

#[tokio::test]
async fn test_command_execute() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao
        .expect("execute")
        .return_ok(json!({"orderKey": 3, "result": "cleared"}));
    let schema = ModelSchema::builder("Order")
        .command()
        .property(PropertyDescriptor::integer("orderKey"))
        .property(PropertyDescriptor::text("result").read_only())
        .build()
        .unwrap();

    let command = h.portal.execute(&schema, json!({"orderKey": 3})).await.unwrap();

    assert_eq!(command.property_value("result"), Some(&json!("cleared")));
    assert_eq!(command.state(), Some(ModelState::Created));
    assert_eq!(h.order_dao.calls()[0].argument, json!({"orderKey": 3, "result": null}));
    assert_eq!(
        h.connections.events().last(),
        Some(&ConnectionEvent::Commit("default".into()))
    );
}

#[tokio::test]
async fn test_paged_collection_fetch() {
    let h = harness(NoAccessBehavior::Skip);
    h.line_dao.returning(
        "fetchByName",
        json!({ "items": stored_lines(), "totalItems": 12 }),
    );
    let schema = line_schema();

    let lines = h
        .portal
        .fetch_collection_with(&schema, "fetchByName", json!({"productName": "B"}))
        .await
        .unwrap();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines.total_items(), Some(12));
    assert_eq!(lines.get(0).unwrap().key(), json!(100));
    assert_eq!(lines.get(1).unwrap().property_value("productName"), Some(&json!("Nut")));
    assert!(lines.iter().all(|l| l.state() == Some(ModelState::Pristine)));
}

#[tokio::test]
async fn test_client_edits_apply_through_checked_setters() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning("fetch", stored_order());
    h.line_dao.returning("fetchForOrder", stored_lines());
    let schema = order_schema(Rules::new());
    let mut order = h.portal.fetch(&schema, json!({"orderKey": 1})).await.unwrap();

    let mut cto = order.to_cto();
    cto["orderKey"] = json!(99);
    cto["vendorName"] = json!("Red Panda");
    cto["lines"][1]["quantity"] = json!(9);
    order.from_cto(&cto).unwrap();

    // Read-only key untouched, edits marked as changes
    assert_eq!(order.key(), json!(1));
    assert_eq!(order.get("vendorName"), Some(&json!("Red Panda")));
    assert!(order.is_self_dirty());
    let lines = order.children("lines").unwrap();
    assert_eq!(lines.get(0).unwrap().state(), Some(ModelState::Pristine));
    assert_eq!(lines.get(1).unwrap().state(), Some(ModelState::Changed));
    assert_eq!(lines.get(1).unwrap().get("quantity"), Some(&json!(9)));
    assert_eq!(
        order.child("address").unwrap().state(),
        Some(ModelState::Pristine)
    );

    // A shorter list edits only the rows it covers
    let lines = order.children_mut("lines").unwrap();
    lines.from_cto(&json!([{ "productName": "Hex bolt" }])).unwrap();
    assert_eq!(lines.get(0).unwrap().get("productName"), Some(&json!("Hex bolt")));
    assert_eq!(lines.get(1).unwrap().get("productName"), Some(&json!("Nut")));
}

// --- Root Collections ---

#[tokio::test]
async fn test_root_collection_create_save_and_remove() {
    let h = harness(NoAccessBehavior::Skip);
    h.line_dao.on("insert", counter_handler("lineKey", 200));
    h.line_dao.returning("remove", Value::Null);
    let schema = line_schema();

    // 1. Create an empty list and add two lines
    let mut lines = h.portal.create_collection(&schema).unwrap();
    assert_eq!(lines.state(), Some(ModelState::Created));
    for name in ["Bolt", "Nut"] {
        let line = lines.create_item().await.unwrap().unwrap();
        line.set("productName", json!(name)).unwrap();
    }

    // 2. One transaction inserts both
    assert_eq!(lines.save().await.unwrap(), Outcome::Saved);
    assert_eq!(lines.state(), Some(ModelState::Pristine));
    assert_eq!(h.line_dao.call_count("insert"), 2);
    assert_eq!(lines.get(1).unwrap().key(), json!(201));
    assert_eq!(
        lines.save().await.unwrap(),
        Outcome::Skipped(SkipReason::NothingToSave)
    );

    // 3. Remove one line
    lines.remove_item(0).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines.save().await.unwrap(), Outcome::Saved);
    assert_eq!(lines.len(), 1);
    assert_eq!(h.line_dao.calls()[2].argument, json!(200));

    // 4. Remove the rest
    lines.mark_for_removal().unwrap();
    assert_eq!(lines.state(), Some(ModelState::MarkedForRemoval));
    assert_eq!(lines.save().await.unwrap(), Outcome::Saved);
    assert_eq!(lines.state(), Some(ModelState::Removed));
    assert!(lines.is_empty());
    assert_eq!(h.line_dao.call_count("remove"), 2);

    let begins = h
        .connections
        .events()
        .iter()
        .filter(|e| matches!(e, ConnectionEvent::Begin(_)))
        .count();
    assert_eq!(begins, 3);
}

#[tokio::test]
async fn test_collection_item_failure_rolls_back_the_list() {
    let h = harness(NoAccessBehavior::Skip);
    h.line_dao.returning("fetch", stored_lines());
    h.line_dao.expect("remove").return_ok(Value::Null);
    h.line_dao
        .expect("update")
        .return_err(PortalError::Storage("lock timeout".into()));
    let schema = line_schema();

    let mut lines = h.portal.fetch_collection(&schema, json!({})).await.unwrap();
    lines.remove_item(0).unwrap();
    lines.get_mut(1).unwrap().set("quantity", json!(9)).unwrap();

    // 1. The update fails after the removal went through
    let err = lines.save().await.unwrap_err();
    match &err {
        PortalError::DataPortal {
            operation, model, ..
        } => {
            assert_eq!(*operation, PortalOperation::Update);
            assert_eq!(model, "Line");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        h.connections.events().last(),
        Some(&ConnectionEvent::Rollback("default".into()))
    );

    // 2. The removed line is back, still waiting for its removal
    assert_eq!(lines.len(), 2);
    assert_eq!(lines.state(), Some(ModelState::Changed));
    assert_eq!(
        lines.get(0).unwrap().state(),
        Some(ModelState::MarkedForRemoval)
    );
    assert_eq!(lines.get(1).unwrap().state(), Some(ModelState::Changed));

    // 3. Retry commits both writes
    h.line_dao.returning("remove", Value::Null);
    h.line_dao.returning("update", Value::Null);
    assert_eq!(lines.save().await.unwrap(), Outcome::Saved);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines.get(0).unwrap().key(), json!(101));
    assert_eq!(h.line_dao.call_count("remove"), 2);
    assert_eq!(h.line_dao.call_count("update"), 2);
    h.line_dao.verify();
}

// --- Hooks And Access ---

struct ArchivedFetch;

#[async_trait]
impl DataHook for ArchivedFetch {
    async fn run(
        &self,
        ctx: &mut DataPortalContext<'_>,
        argument: Value,
    ) -> Result<Value, PortalError> {
        let row = ctx.call("fetchArchived", argument).await?;
        ctx.set_value("orderKey", row["orderKey"].clone())?;
        ctx.set_value("vendorName", row["vendorName"].clone())?;
        Ok(row)
    }
}

struct StampedCreate;

#[async_trait]
impl DataHook for StampedCreate {
    async fn run(
        &self,
        ctx: &mut DataPortalContext<'_>,
        _argument: Value,
    ) -> Result<Value, PortalError> {
        let vendor = format!("Drafted by {}", ctx.user().unwrap_or("nobody"));
        ctx.set_value("vendorName", json!(vendor))?;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn test_fetch_and_create_hooks_replace_dao_calls() {
    let h = harness(NoAccessBehavior::Skip);
    h.order_dao.returning(
        "fetchArchived",
        json!({"orderKey": 8, "vendorName": "Archive Ltd"}),
    );
    let schema = ModelSchema::builder("Order")
        .property(PropertyDescriptor::integer("orderKey").key().read_only())
        .property(PropertyDescriptor::text("vendorName"))
        .extensions(
            ExtensionSet::new()
                .data_fetch(Arc::new(ArchivedFetch))
                .data_create(Arc::new(StampedCreate)),
        )
        .build()
        .unwrap();

    let draft = h.portal.create(&schema).await.unwrap();
    assert_eq!(draft.state(), Some(ModelState::Created));
    assert_eq!(draft.get("vendorName"), Some(&json!("Drafted by ada")));
    assert!(h.order_dao.calls().is_empty());

    let order = h.portal.fetch(&schema, json!({"orderKey": 8})).await.unwrap();
    assert_eq!(order.state(), Some(ModelState::Pristine));
    assert_eq!(order.key(), json!(8));
    assert_eq!(order.get("vendorName"), Some(&json!("Archive Ltd")));
    assert_eq!(h.order_dao.methods_called(), ["fetchArchived"]);
    assert_eq!(h.order_dao.calls()[0].argument, json!({"orderKey": 8}));
}

#[tokio::test]
async fn test_denied_fetch_with_warn_behavior_is_skipped() {
    let h = harness(NoAccessBehavior::Warn);
    h.order_dao.returning("fetch", stored_order());
    let schema = order_schema(Rules::new().deny(AuthorizationAction::FetchObject));

    let mut order = h.portal.instance(&schema);
    assert_eq!(
        order.fetch(json!({"orderKey": 1})).await.unwrap(),
        Outcome::Skipped(SkipReason::Unauthorized)
    );
    assert_eq!(order.state(), None);
    assert!(h.order_dao.calls().is_empty());
    assert!(h.connections.events().is_empty());
}
