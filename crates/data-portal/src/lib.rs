//! # Data Portal
//!
//! This crate turns declarative property and rule definitions into stateful
//! business objects backed by pluggable data access objects (DAOs). It owns
//! the object lifecycle and the orchestration around persistence; how a DAO
//! stores its data is none of its business.
//!
//! ## Architecture Overview
//!
//! 1. **Registration** ([`ModelSchema`]) - properties, rules and extension hooks of a model type, compiled once
//! 2. **Instances** ([`Model`], [`ModelCollection`]) - property values, lifecycle state, broken rules
//! 3. **Data portal** ([`Model::create`], [`Model::fetch`], [`Model::save`], [`Model::execute`]) - permission gate, DAO call, child cascade, state transition
//! 4. **Collaborators** ([`Dao`], [`ConnectionManager`], [`RuleManager`], [`PortalConfig`]) - traits supplied by the application
//!
//! ## Lifecycle
//!
//! ```text
//!            create                 set / child change            save
//!   null ───────────► created ─────────────────────────────────► pristine
//!     │                  │ remove                                   ▲  │ set
//!     │ fetch            ▼                                     save │  ▼
//!     └─────────────► pristine ◄──────────────────────────────── changed
//!                        │ remove                                   │ remove
//!                        ▼                                          ▼
//!                  markedForRemoval ──────────── save ──────────► removed
//! ```
//!
//! See [`state`] for the full transition table.
//!
//! ## Example
//!
//! ```rust
//! use data_portal::mock::MockDao;
//! use data_portal::{
//!     DaoRegistry, DataPortal, ModelSchema, ModelState, Outcome, PortalConfig,
//!     PropertyDescriptor, Rules,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let schema = ModelSchema::builder("Vendor")
//!         .property(PropertyDescriptor::integer("vendorKey").key().read_only())
//!         .property(PropertyDescriptor::text("name"))
//!         .rules(Rules::new().required("name", "Name is required."))
//!         .build()
//!         .unwrap();
//!
//!     let dao = MockDao::new("VendorDao");
//!     dao.expect("insert").return_ok(json!({"vendorKey": 7}));
//!
//!     let config = PortalConfig::builder()
//!         .dao_builder(Arc::new(DaoRegistry::new().register("Vendor", Arc::new(dao.clone()))))
//!         .build()
//!         .unwrap();
//!     let portal = DataPortal::new(config);
//!
//!     let mut vendor = portal.create(&schema).await.unwrap();
//!     vendor.set("name", json!("Blue Zebra")).unwrap();
//!
//!     assert_eq!(vendor.save().await.unwrap(), Outcome::Inserted);
//!     assert_eq!(vendor.state(), Some(ModelState::Pristine));
//!     assert_eq!(vendor.key(), json!(7));
//!     dao.verify();
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Every DAO and connection-manager call is an `.await` point; property
//!   access, validation and state transitions are synchronous.
//! - Sibling children are driven concurrently and joined: all of them
//!   finish, then the first failure in declaration order is reported.
//! - One connection or transaction per top-level call, shared by the whole
//!   cascade.
//!
//! ## Testing
//!
//! The [`mock`] module provides [`mock::MockDao`] and
//! [`mock::RecordingConnectionManager`] for tests that need no storage.

mod checkpoint;
pub mod collection;
pub mod config;
pub mod connection;
pub mod context;
pub mod dao;
pub mod error;
pub mod extension;
pub mod factory;
pub mod mock;
pub mod model;
pub mod portal;
pub mod property;
pub mod rules;
pub mod schema;
pub mod state;
pub mod store;
pub mod tracing;

// Re-export core types for convenience
pub use collection::ModelCollection;
pub use config::{NoAccessBehavior, PortalConfig, PortalConfigBuilder, PortalSettings};
pub use connection::{Connection, ConnectionManager, NoConnectionManager};
pub use context::DataPortalContext;
pub use dao::{run_method, Dao, DaoBuilder, DaoRegistry, Dto};
pub use error::{PortalError, PortalOperation, TransitionError};
pub use extension::{DataHook, ExtensionSet, PropertyWrite};
pub use factory::DataPortal;
pub use model::Model;
pub use portal::{Outcome, SkipReason};
pub use property::{KeyDefinition, PropertyDescriptor, PropertyManager, PropertyRead, ValueType};
pub use rules::{
    AuthorizationAction, AuthorizationContext, BrokenRule, BrokenRuleList, RuleManager,
    RuleSeverity, Rules,
};
pub use schema::{ModelKind, ModelSchema, ModelSchemaBuilder};
pub use state::{LifecycleCell, ModelState};
pub use store::{PropertyStore, PropertyValue};
