//! # Model Collections
//!
//! A [`ModelCollection`] is an ordered list of models of one item schema,
//! either standalone (a paged list fetched from a DAO) or owned by a parent
//! model as a child-collection property.
//!
//! Items report their changes to the collection, the collection reports to
//! its owner. Saving cascades across all items; items removed by the save are
//! dropped from the list once the transaction commits.

use crate::config::PortalConfig;
use crate::connection::Connection;
use crate::dao::run_method;
use crate::error::{PortalError, PortalOperation};
use crate::model::{authorize, resolve_dao, Model};
use crate::portal::{begin, close, fetch_action, finish, join_fail_first, open, Outcome, SkipReason, Wave};
use crate::schema::ModelSchema;
use crate::state::{transition, LifecycleCell, ModelState, Transition};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct ModelCollection {
    schema: Arc<ModelSchema>,
    portal: Arc<PortalConfig>,
    pub(crate) lifecycle: LifecycleCell,
    fetch_method: Option<String>,
    pub(crate) items: Vec<Model>,
    total_items: Option<u64>,
}

impl ModelCollection {
    /// A standalone collection of `schema` items.
    pub fn new(schema: Arc<ModelSchema>, portal: Arc<PortalConfig>) -> Self {
        Self::with_lifecycle(schema, portal, LifecycleCell::new(), None)
    }

    pub(crate) fn new_child(
        schema: Arc<ModelSchema>,
        portal: Arc<PortalConfig>,
        parent: &LifecycleCell,
        fetch_method: Option<String>,
    ) -> Self {
        Self::with_lifecycle(schema, portal, LifecycleCell::with_parent(parent), fetch_method)
    }

    fn with_lifecycle(
        schema: Arc<ModelSchema>,
        portal: Arc<PortalConfig>,
        lifecycle: LifecycleCell,
        fetch_method: Option<String>,
    ) -> Self {
        Self {
            schema,
            portal,
            lifecycle,
            fetch_method,
            items: Vec::new(),
            total_items: None,
        }
    }

    /// Schema of the items.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn state(&self) -> Option<ModelState> {
        self.lifecycle.state()
    }

    pub fn is_dirty(&self) -> bool {
        self.lifecycle.lock().is_dirty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total row count reported by a paged fetch.
    pub fn total_items(&self) -> Option<u64> {
        self.total_items
    }

    pub fn get(&self, index: usize) -> Option<&Model> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Model> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Model> {
        self.items.iter_mut()
    }

    /// Initializes an empty, created collection.
    pub fn create(&mut self) -> Result<(), PortalError> {
        if transition(self.state(), ModelState::Created)? == Transition::NoOp {
            return Ok(());
        }
        self.lifecycle.mark_as_created()?;
        self.items.clear();
        self.total_items = None;
        Ok(())
    }

    /// Creates a new item and appends it. Returns `None` when the create was
    /// skipped for lack of permission.
    #[instrument(skip(self), fields(model = %self.schema.name()))]
    pub async fn create_item(&mut self) -> Result<Option<&mut Model>, PortalError> {
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.schema.name().to_string();
        let mut item = Model::new_child(self.schema.clone(), portal.clone(), &self.lifecycle);

        let conn = open(&portal, &source, PortalOperation::Create, &name).await?;
        let result = item.create_in(&conn).await;
        let outcome = close(&portal, &source, conn, result, PortalOperation::Create, &name).await?;

        if outcome.is_skipped() {
            return Ok(None);
        }
        self.items.push(item);
        debug!(model = %name, index = self.items.len() - 1, "Item created");
        Ok(self.items.last_mut())
    }

    pub async fn fetch(&mut self, filter: Value) -> Result<Outcome, PortalError> {
        self.fetch_with("fetch", filter).await
    }

    /// Loads the items with a DAO list method. The DAO returns either an array
    /// of rows or a page `{ "items": [...], "totalItems": n }`. Permission is
    /// checked once for the whole list.
    #[instrument(skip(self, filter), fields(model = %self.schema.name()))]
    pub async fn fetch_with(&mut self, method: &str, filter: Value) -> Result<Outcome, PortalError> {
        if !authorize(&self.schema, &self.portal, &fetch_action(method))? {
            return Ok(Outcome::Skipped(SkipReason::Unauthorized));
        }
        transition(self.state(), ModelState::Pristine)?;
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.schema.name().to_string();

        let conn = open(&portal, &source, PortalOperation::Fetch, &name).await?;
        let result = self.fetch_rows(&conn, method, filter).await;
        close(&portal, &source, conn, result, PortalOperation::Fetch, &name).await?;

        info!(model = %name, method, count = self.items.len(), total = ?self.total_items, "Fetched list");
        Ok(Outcome::Fetched)
    }

    async fn fetch_rows(
        &mut self,
        conn: &Connection,
        method: &str,
        argument: Value,
    ) -> Result<(), PortalError> {
        let name = self.schema.name().to_string();
        let wrap = |e: PortalError| e.wrap(PortalOperation::Fetch, &name, method);
        let dao = resolve_dao(&self.schema, &self.portal).map_err(wrap)?;
        let rows = run_method(dao.as_ref(), method, conn, argument)
            .await
            .map_err(wrap)?;
        self.load_from_dto(conn, &rows).await.map_err(wrap)
    }

    /// Loads a child collection: from the parent's DTO slice when present,
    /// otherwise through the relationship fetcher with the parent keys.
    pub(crate) async fn load_for_parent(
        &mut self,
        conn: &Connection,
        slice: Option<&Value>,
        parent_keys: &Map<String, Value>,
    ) -> Result<(), PortalError> {
        if let Some(slice) = slice {
            return self.load_from_dto(conn, slice).await;
        }
        match self.fetch_method.clone() {
            Some(method) => {
                self.fetch_rows(conn, &method, Value::Object(parent_keys.clone()))
                    .await
            }
            None => {
                self.items.clear();
                self.total_items = None;
                self.lifecycle.mark_as_pristine()?;
                Ok(())
            }
        }
    }

    /// Replaces the items with the rows of `dto`. Rows are loaded
    /// concurrently and kept in input order.
    async fn load_from_dto(&mut self, conn: &Connection, dto: &Value) -> Result<(), PortalError> {
        let (rows, total) = split_page(self.schema.name(), dto)?;
        let mut items: Vec<Model> = rows
            .iter()
            .map(|_| Model::new_child(self.schema.clone(), self.portal.clone(), &self.lifecycle))
            .collect();
        let loads = items
            .iter_mut()
            .zip(rows.iter())
            .map(|(item, row)| item.load_from_dto(conn, row));
        join_fail_first(loads).await?;

        self.items = items;
        self.total_items = total;
        self.lifecycle.mark_as_pristine()?;
        Ok(())
    }

    /// Saves every item in one transaction. On rollback the items and the
    /// collection return to their state before the call.
    #[instrument(skip(self), fields(model = %self.schema.name()))]
    pub async fn save(&mut self) -> Result<Outcome, PortalError> {
        if !self.is_dirty() && !self.items.iter().any(Model::is_dirty) {
            return Ok(Outcome::Skipped(SkipReason::NothingToSave));
        }
        let portal = self.portal.clone();
        let source = self.data_source().to_string();
        let name = self.schema.name().to_string();
        let keys = Map::new();

        let checkpoint = self.checkpoint();
        let conn = begin(&portal, &source, PortalOperation::Update, &name).await?;
        let mut result = Ok(());
        for wave in Wave::ALL {
            result = self
                .save_wave(&conn, &keys, wave)
                .await
                .map_err(|e| e.wrap(PortalOperation::Update, &name, "save"));
            if result.is_err() {
                break;
            }
        }
        let committed = finish(&portal, &source, conn, result, PortalOperation::Update, &name).await;
        if let Err(error) = committed {
            self.restore(checkpoint);
            return Err(error);
        }
        self.settle();

        info!(model = %name, count = self.items.len(), "Saved list");
        Ok(Outcome::Saved)
    }

    /// Saves the items that belong to `wave`. The last wave also moves the
    /// collection itself to pristine or removed. Removed items stay in the
    /// list until the transaction commits.
    pub(crate) async fn save_wave(
        &mut self,
        conn: &Connection,
        keys: &Map<String, Value>,
        wave: Wave,
    ) -> Result<(), PortalError> {
        let saves = self
            .items
            .iter_mut()
            .filter(|item| wave.includes(item.state()))
            .map(|item| item.save_child(conn, keys).map(|r| r.map(|_| ())));
        join_fail_first(saves).await?;

        if wave == Wave::Others {
            match self.state() {
                Some(ModelState::MarkedForRemoval) => self.lifecycle.mark_as_removed()?,
                Some(ModelState::Created) | Some(ModelState::Changed) => {
                    self.lifecycle.mark_as_pristine()?
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Marks one item for removal. An item that was never saved is dropped
    /// right away.
    pub fn remove_item(&mut self, index: usize) -> Result<(), PortalError> {
        let name = self.schema.name().to_string();
        let item = self
            .items
            .get_mut(index)
            .ok_or_else(|| PortalError::NotFound(format!("{name} item #{index}")))?;
        item.remove()?;
        if item.state() == Some(ModelState::Removed) {
            self.items.remove(index);
        }
        Ok(())
    }

    /// Marks every item, and the collection itself, for removal.
    pub fn mark_for_removal(&mut self) -> Result<(), PortalError> {
        if self.state().is_none() {
            return Ok(());
        }
        let step = transition(self.state(), ModelState::MarkedForRemoval)?;
        for item in self.items.iter_mut().filter(|item| item.state().is_some()) {
            item.remove()?;
        }
        if let Transition::Apply(_) = step {
            self.lifecycle.mark_for_removal()?;
        }
        Ok(())
    }

    /// Whether every item passes validation.
    pub fn is_valid(&mut self) -> bool {
        self.items.iter_mut().fold(true, |valid, item| item.is_valid() && valid)
    }

    pub fn to_cto(&self) -> Value {
        Value::Array(
            self.items
                .iter()
                .filter(|item| item.state() != Some(ModelState::Removed))
                .map(Model::to_cto)
                .collect(),
        )
    }

    /// Applies client edits item by item, matched by position.
    pub fn from_cto(&mut self, cto: &Value) -> Result<(), PortalError> {
        let Some(rows) = cto.as_array() else {
            return Ok(());
        };
        for (item, row) in self.items.iter_mut().zip(rows) {
            if item.state().is_some() {
                item.from_cto(row)?;
            }
        }
        Ok(())
    }

    fn data_source(&self) -> &str {
        crate::model::data_source(&self.schema, &self.portal)
    }
}

impl fmt::Debug for ModelCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCollection")
            .field("item", &self.schema.name())
            .field("state", &self.state())
            .field("items", &self.items)
            .field("total_items", &self.total_items)
            .finish()
    }
}

/// Splits a list result into rows and the optional total count.
fn split_page(model: &str, dto: &Value) -> Result<(Vec<Value>, Option<u64>), PortalError> {
    match dto {
        Value::Null => Ok((Vec::new(), None)),
        Value::Array(rows) => Ok((rows.clone(), None)),
        Value::Object(page) => match page.get("items") {
            Some(Value::Array(rows)) => Ok((
                rows.clone(),
                page.get("totalItems").and_then(Value::as_u64),
            )),
            _ => Err(PortalError::TypeMismatch {
                property: format!("{model} list"),
                expected: "an array or an object with an 'items' array".into(),
            }),
        },
        _ => Err(PortalError::TypeMismatch {
            property: format!("{model} list"),
            expected: "an array or an object with an 'items' array".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pages_and_plain_arrays_are_both_accepted() {
        let (rows, total) = split_page("View", &json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(total, None);

        let (rows, total) =
            split_page("View", &json!({"items": [{"a": 1}], "totalItems": 40})).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(total, Some(40));

        assert!(split_page("View", &Value::Null).unwrap().0.is_empty());
        assert!(split_page("View", &json!("rows")).is_err());
    }
}
