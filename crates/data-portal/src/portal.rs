//! # Data Portal Operations
//!
//! The async half of [`Model`]: every operation that reaches storage. Each
//! one follows the same template:
//!
//! 1. permission gate (a denial skips the operation, see [`NoAccessBehavior`](crate::NoAccessBehavior))
//! 2. extension hook, or the standard DAO call
//! 3. cascade to children
//! 4. state transition
//!
//! Top-level calls own the connection: `create` and `fetch` open and close
//! one, `save` and `execute` run inside a transaction that is committed on
//! success and rolled back on failure. Children reuse the caller's
//! connection.
//!
//! Siblings are driven concurrently with [`join_all`]: every child gets to
//! finish, then the first failure in declaration order is reported.
//!
//! ```text
//! save() ── created ──────────► insert ─► children ─► pristine
//!        ── changed ──────────► update* ─► children ─► pristine
//!        ── markedForRemoval ─► children ─► remove ─► removed
//!                                   * only when own properties changed
//! ```

use crate::config::PortalConfig;
use crate::connection::Connection;
use crate::context::DataPortalContext;
use crate::dao::run_method;
use crate::error::{PortalError, PortalOperation};
use crate::extension::DataHook;
use crate::model::Model;
use crate::rules::AuthorizationAction;
use crate::schema::ModelKind;
use crate::state::{transition, ModelState};
use crate::store::PropertyValue;
use async_recursion::async_recursion;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why an operation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Validation rules are broken; see [`Model::broken_rules`].
    Invalid,
    /// The current user may not perform the operation.
    Unauthorized,
    /// The model has no pending changes.
    NothingToSave,
}

/// What a data-portal operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Fetched,
    Inserted,
    Updated,
    Removed,
    Executed,
    /// A collection save finished.
    Saved,
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }
}

/// Children are saved in two waves so removals reach storage before
/// sibling inserts and updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wave {
    Removals,
    Others,
}

impl Wave {
    pub(crate) const ALL: [Wave; 2] = [Wave::Removals, Wave::Others];

    pub(crate) fn includes(self, state: Option<ModelState>) -> bool {
        let marked = state == Some(ModelState::MarkedForRemoval);
        match self {
            Wave::Removals => marked,
            Wave::Others => !marked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveOp {
    Insert,
    Update,
    Remove,
}

impl SaveOp {
    fn operation(self) -> PortalOperation {
        match self {
            SaveOp::Insert => PortalOperation::Insert,
            SaveOp::Update => PortalOperation::Update,
            SaveOp::Remove => PortalOperation::Remove,
        }
    }

    fn method(self) -> &'static str {
        match self {
            SaveOp::Insert => "insert",
            SaveOp::Update => "update",
            SaveOp::Remove => "remove",
        }
    }
}

enum SavePlan {
    Run(SaveOp),
    Skip(SkipReason),
}

impl Model {
    /// Initializes a new instance with default values, from the DAO's
    /// `create` method when it has one. Children are created recursively.
    #[instrument(skip(self), fields(model = %self.name()))]
    pub async fn create(&mut self) -> Result<Outcome, PortalError> {
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.name().to_string();

        let conn = open(&portal, &source, PortalOperation::Create, &name).await?;
        let result = self.create_in(&conn).await;
        let outcome = close(&portal, &source, conn, result, PortalOperation::Create, &name).await?;

        if !outcome.is_skipped() {
            info!(model = %name, state = ?self.state(), "Created");
        }
        Ok(outcome)
    }

    #[async_recursion]
    pub(crate) async fn create_in(&mut self, conn: &Connection) -> Result<Outcome, PortalError> {
        let name = self.name().to_string();
        let wrap = |e: PortalError| e.wrap(PortalOperation::Create, &name, "create");
        transition(self.state(), ModelState::Created).map_err(|e| wrap(e.into()))?;

        match self.schema.extensions().data_create.clone() {
            Some(hook) => {
                if !self.authorize(&AuthorizationAction::CreateObject)? {
                    return Ok(Outcome::Skipped(SkipReason::Unauthorized));
                }
                self.run_hook(hook, conn, Value::Null).await.map_err(wrap)?;
            }
            None => {
                let dao = self.dao().map_err(wrap)?;
                if dao.has_method("create") {
                    let dto = run_method(dao.as_ref(), "create", conn, Value::Null)
                        .await
                        .map_err(wrap)?;
                    self.from_dto(&dto).map_err(wrap)?;
                }
            }
        }

        for (_, slot) in self.store.child_slots_mut() {
            if let PropertyValue::Collection(collection) = slot {
                collection.create().map_err(wrap)?;
            }
        }
        let children = self.store.child_slots_mut().filter_map(move |(_, slot)| match slot {
            PropertyValue::Child(child) => Some(child.create_in(conn).map(|r| r.map(|_| ()))),
            _ => None,
        });
        join_fail_first(children).await.map_err(wrap)?;

        self.lifecycle.mark_as_created().map_err(|e| wrap(e.into()))?;
        Ok(Outcome::Created)
    }

    /// Loads the instance with the DAO's `fetch` method.
    pub async fn fetch(&mut self, filter: Value) -> Result<Outcome, PortalError> {
        self.fetch_with("fetch", filter).await
    }

    /// Loads the instance with an alternate DAO method such as `fetchByName`.
    /// A `null` result is reported as not found.
    #[instrument(skip(self, filter), fields(model = %self.name()))]
    pub async fn fetch_with(&mut self, method: &str, filter: Value) -> Result<Outcome, PortalError> {
        if !self.authorize(&fetch_action(method))? {
            return Ok(Outcome::Skipped(SkipReason::Unauthorized));
        }
        transition(self.state(), ModelState::Pristine)?;
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.name().to_string();

        let conn = open(&portal, &source, PortalOperation::Fetch, &name).await?;
        let result = self.fetch_in(&conn, method, filter).await;
        let outcome = close(&portal, &source, conn, result, PortalOperation::Fetch, &name).await?;

        info!(model = %name, method, "Fetched");
        Ok(outcome)
    }

    async fn fetch_in(
        &mut self,
        conn: &Connection,
        method: &str,
        filter: Value,
    ) -> Result<Outcome, PortalError> {
        let name = self.name().to_string();
        let wrap = |e: PortalError| e.wrap(PortalOperation::Fetch, &name, method);

        let dto = match self.schema.extensions().data_fetch.clone() {
            Some(hook) => self.run_hook(hook, conn, filter).await.map_err(wrap)?,
            None => {
                let dao = self.dao().map_err(wrap)?;
                let dto = run_method(dao.as_ref(), method, conn, filter.clone())
                    .await
                    .map_err(wrap)?;
                if dto.is_null() {
                    return Err(wrap(PortalError::NotFound(format!("{name} matching {filter}"))));
                }
                self.from_dto(&dto).map_err(wrap)?;
                dto
            }
        };

        self.load_children(conn, &dto).await.map_err(wrap)?;
        self.lifecycle.mark_as_pristine().map_err(|e| wrap(e.into()))?;
        Ok(Outcome::Fetched)
    }

    /// Loads a child from its slice of the parent's DTO. No DAO round trip
    /// and no permission check: the parent fetch already passed both.
    #[async_recursion]
    pub(crate) async fn load_from_dto(
        &mut self,
        conn: &Connection,
        dto: &Value,
    ) -> Result<(), PortalError> {
        let name = self.name().to_string();
        let wrap = |e: PortalError| e.wrap(PortalOperation::Fetch, &name, "from_dto");
        self.from_dto(dto).map_err(wrap)?;
        self.load_children(conn, dto).await.map_err(wrap)?;
        self.lifecycle.mark_as_pristine().map_err(|e| wrap(e.into()))?;
        Ok(())
    }

    async fn load_children(&mut self, conn: &Connection, dto: &Value) -> Result<(), PortalError> {
        let parent_keys = self.key_values();
        let parent_keys = &parent_keys;

        let loads: Vec<BoxFuture<'_, Result<(), PortalError>>> = self
            .store
            .child_slots_mut()
            .filter_map(move |(descriptor, slot)| {
                let slice = dto.get(descriptor.name()).filter(|v| !v.is_null());
                match slot {
                    PropertyValue::Child(child) => match slice {
                        Some(slice) => Some(child.load_from_dto(conn, slice).boxed()),
                        None => None,
                    },
                    PropertyValue::Collection(collection) => {
                        Some(collection.load_for_parent(conn, slice, parent_keys).boxed())
                    }
                    PropertyValue::Scalar(_) => None,
                }
            })
            .collect();
        join_fail_first(loads).await
    }

    /// Persists pending changes: insert when created, update when changed,
    /// remove when marked for removal. Children are saved in the same
    /// transaction.
    ///
    /// When the transaction rolls back, the whole tree returns to what it
    /// was before the call, so the same save can be retried.
    #[instrument(skip(self), fields(model = %self.name()))]
    pub async fn save(&mut self) -> Result<Outcome, PortalError> {
        let op = match self.plan_save()? {
            SavePlan::Run(op) => op,
            SavePlan::Skip(reason) => {
                debug!(model = self.name(), ?reason, "Save skipped");
                return Ok(Outcome::Skipped(reason));
            }
        };
        let operation = op.operation();
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.name().to_string();

        let checkpoint = self.checkpoint();
        let conn = begin(&portal, &source, operation, &name).await?;
        let result = self.run_save(&conn, &Map::new(), op).await;
        match finish(&portal, &source, conn, result, operation, &name).await {
            Ok(outcome) => {
                self.settle();
                info!(model = %name, %operation, state = ?self.state(), "Saved");
                Ok(outcome)
            }
            Err(error) => {
                self.restore(checkpoint);
                debug!(model = %name, state = ?self.state(), "Restored after rollback");
                Err(error)
            }
        }
    }

    #[async_recursion]
    pub(crate) async fn save_child(
        &mut self,
        conn: &Connection,
        parent_keys: &Map<String, Value>,
    ) -> Result<Outcome, PortalError> {
        match self.plan_save()? {
            SavePlan::Run(op) => self.run_save(conn, parent_keys, op).await,
            SavePlan::Skip(reason) => Ok(Outcome::Skipped(reason)),
        }
    }

    fn plan_save(&mut self) -> Result<SavePlan, PortalError> {
        if self.schema.kind() != ModelKind::Editable {
            return Ok(SavePlan::Skip(SkipReason::NothingToSave));
        }
        let (op, action) = match self.state() {
            Some(ModelState::Created) => (SaveOp::Insert, AuthorizationAction::CreateObject),
            Some(ModelState::Changed) => (SaveOp::Update, AuthorizationAction::UpdateObject),
            Some(ModelState::MarkedForRemoval) => (SaveOp::Remove, AuthorizationAction::RemoveObject),
            _ => return Ok(SavePlan::Skip(SkipReason::NothingToSave)),
        };
        if !self.is_valid() {
            return Ok(SavePlan::Skip(SkipReason::Invalid));
        }
        if !self.authorize(&action)? {
            return Ok(SavePlan::Skip(SkipReason::Unauthorized));
        }
        Ok(SavePlan::Run(op))
    }

    async fn run_save(
        &mut self,
        conn: &Connection,
        parent_keys: &Map<String, Value>,
        op: SaveOp,
    ) -> Result<Outcome, PortalError> {
        let name = self.name().to_string();
        let wrap = |e: PortalError| e.wrap(op.operation(), &name, op.method());
        let extensions = self.schema.extensions().clone();

        match op {
            SaveOp::Insert => {
                self.copy_parent_keys(parent_keys);
                self.write(extensions.data_insert, conn, self.to_dto(), op, &name)
                    .await?;
                let keys = self.key_values();
                self.save_children(conn, &keys).await.map_err(wrap)?;
                self.lifecycle.mark_as_pristine().map_err(|e| wrap(e.into()))?;
                Ok(Outcome::Inserted)
            }
            SaveOp::Update => {
                if self.is_self_dirty() {
                    self.write(extensions.data_update, conn, self.to_dto(), op, &name)
                        .await?;
                } else {
                    debug!(model = %name, "No own changes, update call skipped");
                }
                let keys = self.key_values();
                self.save_children(conn, &keys).await.map_err(wrap)?;
                self.lifecycle.mark_as_pristine().map_err(|e| wrap(e.into()))?;
                Ok(Outcome::Updated)
            }
            SaveOp::Remove => {
                let keys = self.key_values();
                self.save_children(conn, &keys).await.map_err(wrap)?;
                self.write(extensions.data_remove, conn, self.key(), op, &name)
                    .await?;
                self.lifecycle.mark_as_removed().map_err(|e| wrap(e.into()))?;
                Ok(Outcome::Removed)
            }
        }
    }

    /// One storage write through the hook or DAO. A returned object carries
    /// generated values (keys, timestamps) and is copied back.
    async fn write(
        &mut self,
        hook: Option<Arc<dyn DataHook>>,
        conn: &Connection,
        argument: Value,
        op: SaveOp,
        name: &str,
    ) -> Result<(), PortalError> {
        let method = op.method();
        let wrap = |e: PortalError| e.wrap(op.operation(), name, method);
        let returned = self.call_storage(hook, method, conn, argument).await.map_err(wrap)?;
        if returned.is_object() {
            self.from_dto(&returned).map_err(wrap)?;
        }
        Ok(())
    }

    async fn save_children(
        &mut self,
        conn: &Connection,
        keys: &Map<String, Value>,
    ) -> Result<(), PortalError> {
        for wave in Wave::ALL {
            let saves: Vec<BoxFuture<'_, Result<(), PortalError>>> = self
                .store
                .child_slots_mut()
                .filter_map(move |(_, slot)| match slot {
                    PropertyValue::Child(child) if wave.includes(child.state()) => {
                        Some(child.save_child(conn, keys).map(|r| r.map(|_| ())).boxed())
                    }
                    PropertyValue::Collection(collection) => {
                        Some(collection.save_wave(conn, keys, wave).boxed())
                    }
                    _ => None,
                })
                .collect();
            join_fail_first(saves).await?;
        }
        Ok(())
    }

    /// Runs a command with the DAO's `execute` method.
    pub async fn execute(&mut self) -> Result<Outcome, PortalError> {
        self.execute_with("execute").await
    }

    /// Runs a command with a named DAO method. The scalar properties go in as
    /// the argument; a returned object is copied back. The state does not
    /// change.
    #[instrument(skip(self), fields(model = %self.name()))]
    pub async fn execute_with(&mut self, method: &str) -> Result<Outcome, PortalError> {
        if self.schema.kind() != ModelKind::Command {
            return Err(PortalError::NotImplemented(format!(
                "execute on non-command model '{}'",
                self.name()
            )));
        }
        if !self.authorize(&AuthorizationAction::ExecuteMethod(method.to_string()))? {
            return Ok(Outcome::Skipped(SkipReason::Unauthorized));
        }
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.name().to_string();

        let conn = begin(&portal, &source, PortalOperation::Execute, &name).await?;
        let result = self.execute_in(&conn, method, &name).await;
        let outcome = finish(&portal, &source, conn, result, PortalOperation::Execute, &name).await?;

        info!(model = %name, method, "Executed");
        Ok(outcome)
    }

    async fn execute_in(
        &mut self,
        conn: &Connection,
        method: &str,
        name: &str,
    ) -> Result<Outcome, PortalError> {
        let wrap = |e: PortalError| e.wrap(PortalOperation::Execute, name, method);
        let hook = self.schema.extensions().data_execute.clone();
        let dto = self.to_dto();
        let returned = self.call_storage(hook, method, conn, dto).await.map_err(wrap)?;
        if returned.is_object() {
            self.from_dto(&returned).map_err(wrap)?;
        }
        Ok(Outcome::Executed)
    }

    async fn call_storage(
        &mut self,
        hook: Option<Arc<dyn DataHook>>,
        method: &str,
        conn: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError> {
        match hook {
            Some(hook) => self.run_hook(hook, conn, argument).await,
            None => {
                let dao = self.dao()?;
                run_method(dao.as_ref(), method, conn, argument).await
            }
        }
    }

    async fn run_hook(
        &mut self,
        hook: Arc<dyn DataHook>,
        conn: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError> {
        let dao = self.dao()?;
        let mut ctx = DataPortalContext::new(
            dao,
            conn,
            self.portal.current_user(),
            self.portal.current_locale(),
            self.is_self_dirty(),
            &mut self.store,
        );
        hook.run(&mut ctx, argument).await
    }
}

pub(crate) fn fetch_action(method: &str) -> AuthorizationAction {
    if method == "fetch" {
        AuthorizationAction::FetchObject
    } else {
        AuthorizationAction::ExecuteMethod(method.to_string())
    }
}

/// Waits for every future, then reports the first failure in input order.
pub(crate) async fn join_fail_first<I, F>(futures: I) -> Result<(), PortalError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<(), PortalError>>,
{
    join_all(futures).await.into_iter().collect()
}

pub(crate) async fn open(
    portal: &PortalConfig,
    source: &str,
    operation: PortalOperation,
    model: &str,
) -> Result<Connection, PortalError> {
    portal
        .connection_manager()
        .open_connection(source)
        .await
        .map_err(|e| e.wrap(operation, model, "open_connection"))
}

/// Closes the connection whatever happened; the operation's own error wins.
pub(crate) async fn close<T>(
    portal: &PortalConfig,
    source: &str,
    conn: Connection,
    result: Result<T, PortalError>,
    operation: PortalOperation,
    model: &str,
) -> Result<T, PortalError> {
    let closed = portal.connection_manager().close_connection(source, conn).await;
    match (result, closed) {
        (Err(error), closed) => {
            if let Err(close_error) = closed {
                warn!(model, error = %close_error, "Closing connection failed");
            }
            Err(error)
        }
        (Ok(_), Err(error)) => Err(error.wrap(operation, model, "close_connection")),
        (Ok(value), Ok(())) => Ok(value),
    }
}

pub(crate) async fn begin(
    portal: &PortalConfig,
    source: &str,
    operation: PortalOperation,
    model: &str,
) -> Result<Connection, PortalError> {
    portal
        .connection_manager()
        .begin_transaction(source)
        .await
        .map_err(|e| e.wrap(operation, model, "begin_transaction"))
}

/// Commits on success, rolls back on failure. A failed rollback is logged
/// and the original error is returned.
pub(crate) async fn finish<T>(
    portal: &PortalConfig,
    source: &str,
    conn: Connection,
    result: Result<T, PortalError>,
    operation: PortalOperation,
    model: &str,
) -> Result<T, PortalError> {
    let manager = portal.connection_manager();
    match result {
        Ok(value) => {
            manager
                .commit_transaction(source, conn)
                .await
                .map_err(|e| e.wrap(operation, model, "commit_transaction"))?;
            Ok(value)
        }
        Err(error) => {
            warn!(model, %operation, error = %error, "Rolling back");
            if let Err(rollback_error) = manager.rollback_transaction(source, conn).await {
                warn!(model, %operation, error = %rollback_error, "Rollback failed");
            }
            Err(error)
        }
    }
}
