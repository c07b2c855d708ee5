//! # Lifecycle State Machine
//!
//! Every [`Model`](crate::Model) tracks where it is in its persistence
//! lifecycle. A model starts uninitialized (`None`), becomes `Created` or
//! `Pristine` through its first create or fetch, turns `Changed` or
//! `MarkedForRemoval` through edits and removal requests, and ends `Removed`.
//!
//! | from \ to        | pristine | created | changed | markedForRemoval | removed |
//! |------------------|----------|---------|---------|------------------|---------|
//! | null             | +        | +       | N       | N                | N       |
//! | pristine         | o        | -       | +       | +                | -       |
//! | created          | +        | o       | o       | + (→ removed)    | +       |
//! | changed          | +        | -       | o       | +                | -       |
//! | markedForRemoval | -        | -       | o       | o                | +       |
//! | removed          | -        | -       | -       | -                | o       |
//!
//! `+` applies the transition, `o` is a no-op, `-` and `N` raise a
//! [`TransitionError`].
//!
//! [`transition`] holds the bare table, [`Lifecycle`] applies it together with
//! the dirty and validation flags, and [`LifecycleCell`] adds the weak link to
//! the parent so a child edit marks its ancestors changed.

use crate::error::TransitionError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::trace;

/// Lifecycle state of an initialized model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelState {
    Pristine,
    Created,
    Changed,
    MarkedForRemoval,
    Removed,
}

impl ModelState {
    /// Whether a model in this state has pending work for `save()`.
    pub fn is_dirty(self) -> bool {
        matches!(
            self,
            ModelState::Created | ModelState::Changed | ModelState::MarkedForRemoval
        )
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelState::Pristine => "pristine",
            ModelState::Created => "created",
            ModelState::Changed => "changed",
            ModelState::MarkedForRemoval => "markedForRemoval",
            ModelState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Result of looking up a requested state change in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given state (which may differ from the requested one).
    Apply(ModelState),
    /// Stay where we are.
    NoOp,
}

/// Looks up `from → to` in the transition table.
pub fn transition(from: Option<ModelState>, to: ModelState) -> Result<Transition, TransitionError> {
    use ModelState::*;

    let illegal = || TransitionError { from, to };
    match (from, to) {
        (None, Pristine) | (None, Created) => Ok(Transition::Apply(to)),
        (None, _) => Err(illegal()),

        (Some(Pristine), Pristine) => Ok(Transition::NoOp),
        (Some(Pristine), Changed) | (Some(Pristine), MarkedForRemoval) => Ok(Transition::Apply(to)),
        (Some(Pristine), _) => Err(illegal()),

        (Some(Created), Pristine) | (Some(Created), Removed) => Ok(Transition::Apply(to)),
        (Some(Created), MarkedForRemoval) => Ok(Transition::Apply(Removed)),
        (Some(Created), Created) | (Some(Created), Changed) => Ok(Transition::NoOp),

        (Some(Changed), Pristine) | (Some(Changed), MarkedForRemoval) => Ok(Transition::Apply(to)),
        (Some(Changed), Changed) => Ok(Transition::NoOp),
        (Some(Changed), _) => Err(illegal()),

        (Some(MarkedForRemoval), Removed) => Ok(Transition::Apply(to)),
        (Some(MarkedForRemoval), Changed) | (Some(MarkedForRemoval), MarkedForRemoval) => {
            Ok(Transition::NoOp)
        }
        (Some(MarkedForRemoval), _) => Err(illegal()),

        (Some(Removed), Removed) => Ok(Transition::NoOp),
        (Some(Removed), _) => Err(illegal()),
    }
}

/// Lifecycle bookkeeping of one model or collection.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: Option<ModelState>,
    is_self_dirty: bool,
    is_validated: bool,
    parent: Option<Weak<Mutex<Lifecycle>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<ModelState> {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_some_and(ModelState::is_dirty)
    }

    pub fn is_self_dirty(&self) -> bool {
        self.is_self_dirty
    }

    pub fn is_validated(&self) -> bool {
        self.is_validated
    }

    pub fn set_validated(&mut self) {
        self.is_validated = true;
    }

    /// Marks the model as matching storage. Clears the self-dirty flag.
    pub fn mark_as_pristine(&mut self) -> Result<(), TransitionError> {
        if let Transition::Apply(next) = transition(self.state, ModelState::Pristine)? {
            self.state = Some(next);
        }
        self.is_self_dirty = false;
        Ok(())
    }

    /// Marks a freshly created model. Returns whether the parent must be told.
    pub fn mark_as_created(&mut self) -> Result<bool, TransitionError> {
        match transition(self.state, ModelState::Created)? {
            Transition::Apply(next) => {
                self.state = Some(next);
                self.is_self_dirty = true;
                self.is_validated = false;
                Ok(true)
            }
            Transition::NoOp => Ok(false),
        }
    }

    /// Records a change, either to own properties (`own_property`) or
    /// cascaded from a child. Returns whether the parent must be told.
    ///
    /// The flag update also happens when the state itself does not move
    /// (created/changed), so an own edit after a child-only change still
    /// reaches storage.
    pub fn mark_as_changed(&mut self, own_property: bool) -> Result<bool, TransitionError> {
        let step = transition(self.state, ModelState::Changed)?;
        if self.state == Some(ModelState::MarkedForRemoval) {
            return Ok(false);
        }
        if let Transition::Apply(next) = step {
            self.state = Some(next);
        }
        self.is_self_dirty |= own_property;
        self.is_validated = false;
        Ok(true)
    }

    /// Requests removal. Returns the state that was applied, if any.
    pub fn mark_for_removal(&mut self) -> Result<Option<ModelState>, TransitionError> {
        match transition(self.state, ModelState::MarkedForRemoval)? {
            Transition::Apply(next) => {
                self.state = Some(next);
                Ok(Some(next))
            }
            Transition::NoOp => Ok(None),
        }
    }

    /// Terminal transition after a successful remove.
    pub fn mark_as_removed(&mut self) -> Result<(), TransitionError> {
        if let Transition::Apply(next) = transition(self.state, ModelState::Removed)? {
            self.state = Some(next);
            self.is_self_dirty = false;
        }
        Ok(())
    }

    /// Saved flags, restored when the transaction they were taken for rolls
    /// back.
    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.state,
            is_self_dirty: self.is_self_dirty,
        }
    }

    /// Puts the flags back as they were at `snapshot`. Validation reruns on
    /// the next check.
    pub fn restore(&mut self, snapshot: LifecycleSnapshot) {
        self.state = snapshot.state;
        self.is_self_dirty = snapshot.is_self_dirty;
        self.is_validated = false;
    }

    /// A descendant changed. Only a pristine model reacts; every other state
    /// already carries pending work (or is still being initialized).
    fn absorb_child_change(&mut self) -> bool {
        if self.state == Some(ModelState::Pristine) {
            self.state = Some(ModelState::Changed);
            true
        } else {
            false
        }
    }
}

/// State and self-dirty flag of a [`Lifecycle`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    state: Option<ModelState>,
    is_self_dirty: bool,
}

/// Shared handle to a [`Lifecycle`].
///
/// The owning model holds the only strong reference; children keep a weak
/// one so they can notify the parent without owning it.
#[derive(Debug, Clone, Default)]
pub struct LifecycleCell {
    inner: Arc<Mutex<Lifecycle>>,
}

impl LifecycleCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lifecycle whose changes propagate into `parent`.
    pub fn with_parent(parent: &LifecycleCell) -> Self {
        let lifecycle = Lifecycle {
            parent: Some(Arc::downgrade(&parent.inner)),
            ..Lifecycle::default()
        };
        Self {
            inner: Arc::new(Mutex::new(lifecycle)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> Option<ModelState> {
        self.lock().state()
    }

    pub fn mark_as_pristine(&self) -> Result<(), TransitionError> {
        self.lock().mark_as_pristine()
    }

    pub fn mark_as_created(&self) -> Result<(), TransitionError> {
        let notify = self.lock().mark_as_created()?;
        if notify {
            self.notify_parent();
        }
        Ok(())
    }

    pub fn mark_as_changed(&self, own_property: bool) -> Result<(), TransitionError> {
        let notify = self.lock().mark_as_changed(own_property)?;
        if notify {
            self.notify_parent();
        }
        Ok(())
    }

    /// Applies the removal request without cascading; the caller cascades to
    /// children first.
    pub fn mark_for_removal(&self) -> Result<Option<ModelState>, TransitionError> {
        let applied = self.lock().mark_for_removal()?;
        if applied == Some(ModelState::MarkedForRemoval) {
            self.notify_parent();
        }
        Ok(applied)
    }

    pub fn mark_as_removed(&self) -> Result<(), TransitionError> {
        self.lock().mark_as_removed()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.lock().snapshot()
    }

    /// Restores without notifying the parent; the parent is restored from
    /// its own snapshot.
    pub fn restore(&self, snapshot: LifecycleSnapshot) {
        self.lock().restore(snapshot)
    }

    /// Walks up the parent chain, turning pristine ancestors into changed.
    fn notify_parent(&self) {
        let mut parent = self.lock().parent.as_ref().and_then(Weak::upgrade);
        while let Some(cell) = parent {
            let mut lifecycle = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if !lifecycle.absorb_child_change() {
                break;
            }
            lifecycle.is_validated = false;
            trace!("child change marked parent as changed");
            parent = lifecycle.parent.as_ref().and_then(Weak::upgrade);
        }
    }
}
