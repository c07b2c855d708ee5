//! Save checkpoints.
//!
//! A save changes models in memory while it runs: states move to pristine or
//! removed, generated keys and parent keys are copied in. When the
//! transaction rolls back none of that reached storage, so the tree is put
//! back to the [`Checkpoint`] taken before the transaction began. Items a
//! save removed stay in their collections until the commit succeeds and
//! [`Model::settle`] drops them.

use crate::collection::ModelCollection;
use crate::model::Model;
use crate::state::{LifecycleSnapshot, ModelState};
use crate::store::PropertyValue;
use serde_json::Value;

#[derive(Debug)]
pub(crate) struct Checkpoint {
    lifecycle: LifecycleSnapshot,
    slots: Vec<SlotCheckpoint>,
}

#[derive(Debug)]
enum SlotCheckpoint {
    Scalar(Value),
    Child(Box<Checkpoint>),
    Collection(CollectionCheckpoint),
}

#[derive(Debug)]
pub(crate) struct CollectionCheckpoint {
    lifecycle: LifecycleSnapshot,
    items: Vec<Checkpoint>,
}

impl Model {
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        let slots = self
            .store
            .slots
            .iter()
            .map(|slot| match slot {
                PropertyValue::Scalar(value) => SlotCheckpoint::Scalar(value.clone()),
                PropertyValue::Child(child) => SlotCheckpoint::Child(Box::new(child.checkpoint())),
                PropertyValue::Collection(collection) => {
                    SlotCheckpoint::Collection(collection.checkpoint())
                }
            })
            .collect();
        Checkpoint {
            lifecycle: self.lifecycle.snapshot(),
            slots,
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.lifecycle.restore(checkpoint.lifecycle);
        for (slot, saved) in self.store.slots.iter_mut().zip(checkpoint.slots) {
            match (slot, saved) {
                (PropertyValue::Scalar(value), SlotCheckpoint::Scalar(saved)) => *value = saved,
                (PropertyValue::Child(child), SlotCheckpoint::Child(saved)) => child.restore(*saved),
                (PropertyValue::Collection(collection), SlotCheckpoint::Collection(saved)) => {
                    collection.restore(saved)
                }
                _ => {}
            }
        }
    }

    /// Drops the items removed by a committed save, at every level.
    pub(crate) fn settle(&mut self) {
        for (_, slot) in self.store.child_slots_mut() {
            match slot {
                PropertyValue::Child(child) => child.settle(),
                PropertyValue::Collection(collection) => collection.settle(),
                PropertyValue::Scalar(_) => {}
            }
        }
    }
}

impl ModelCollection {
    pub(crate) fn checkpoint(&self) -> CollectionCheckpoint {
        CollectionCheckpoint {
            lifecycle: self.lifecycle.snapshot(),
            items: self.items.iter().map(Model::checkpoint).collect(),
        }
    }

    /// Items cannot be added or dropped while a save runs, so the saved
    /// items line up with the current ones.
    pub(crate) fn restore(&mut self, checkpoint: CollectionCheckpoint) {
        self.lifecycle.restore(checkpoint.lifecycle);
        for (item, saved) in self.items.iter_mut().zip(checkpoint.items) {
            item.restore(saved);
        }
    }

    pub(crate) fn settle(&mut self) {
        self.items.retain(|item| item.state() != Some(ModelState::Removed));
        for item in self.items.iter_mut() {
            item.settle();
        }
    }
}
