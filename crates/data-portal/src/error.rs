//! # Portal Errors
//!
//! This module defines the error types used throughout the data portal.
//! Failures travel as [`PortalError`]. Skipped operations (validation or
//! authorization) are not errors: they come back as
//! [`Outcome::Skipped`](crate::Outcome::Skipped) and the caller inspects the
//! broken-rule list.

use crate::state::ModelState;
use std::fmt;

/// The data-portal operation that was running when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalOperation {
    Create,
    Fetch,
    Insert,
    Update,
    Remove,
    Execute,
}

impl fmt::Display for PortalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortalOperation::Create => "create",
            PortalOperation::Fetch => "fetch",
            PortalOperation::Insert => "insert",
            PortalOperation::Update => "update",
            PortalOperation::Remove => "remove",
            PortalOperation::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// An illegal lifecycle-state change was requested.
///
/// `from` is `None` when the model was never initialized by create or fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal state transition from {} to {}", state_name(.from), .to)]
pub struct TransitionError {
    pub from: Option<ModelState>,
    pub to: ModelState,
}

fn state_name(state: &Option<ModelState>) -> String {
    match state {
        Some(state) => state.to_string(),
        None => "null".to_string(),
    }
}

/// Errors that can occur within the data portal.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{operation} of '{model}' failed in '{method}': {source}")]
    DataPortal {
        operation: PortalOperation,
        model: String,
        method: String,
        #[source]
        source: Box<PortalError>,
    },

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Access denied: {action} on '{model}'")]
    AccessDenied { model: String, action: String },

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("DAO '{dao}' has no method '{method}'")]
    NoSuchMethod { dao: String, method: String },

    #[error("No DAO registered for '{model}' on data source '{data_source}'")]
    DaoNotFound { model: String, data_source: String },

    #[error("Property '{property}' is not defined on '{model}'")]
    UnknownProperty { model: String, property: String },

    #[error("Property '{0}' is defined twice")]
    DuplicateProperty(String),

    #[error("Property '{0}' is read-only")]
    ReadOnlyProperty(String),

    #[error("Model '{0}' is read-only")]
    ReadOnlyModel(String),

    #[error("Property '{0}' does not hold a child model")]
    NotAChildProperty(String),

    #[error("Property '{0}' holds a child model and cannot be assigned")]
    ChildProperty(String),

    #[error("Type mismatch on '{property}': expected {expected}")]
    TypeMismatch { property: String, expected: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortalError {
    /// Wraps this error as a data-portal failure.
    ///
    /// An error that is already wrapped passes through untouched, so the
    /// reported operation is always the one where the failure originated.
    pub fn wrap(self, operation: PortalOperation, model: &str, method: &str) -> Self {
        match self {
            PortalError::DataPortal { .. } => self,
            other => PortalError::DataPortal {
                operation,
                model: model.to_string(),
                method: method.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost cause, looking through data-portal wrappers.
    pub fn root_cause(&self) -> &PortalError {
        match self {
            PortalError::DataPortal { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), PortalError::NotFound(_))
    }

    pub fn operation(&self) -> Option<PortalOperation> {
        match self {
            PortalError::DataPortal { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_names_null_state() {
        let err = TransitionError {
            from: None,
            to: ModelState::Changed,
        };
        assert_eq!(err.to_string(), "illegal state transition from null to changed");
    }

    #[test]
    fn wrap_keeps_the_originating_operation() {
        let inner = PortalError::NotFound("order 7".into()).wrap(
            PortalOperation::Fetch,
            "Address",
            "fetchForOrder",
        );
        let outer = inner.wrap(PortalOperation::Fetch, "BlanketOrder", "fetch");

        match &outer {
            PortalError::DataPortal { model, method, .. } => {
                assert_eq!(model, "Address");
                assert_eq!(method, "fetchForOrder");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(outer.is_not_found());
        assert_eq!(outer.operation(), Some(PortalOperation::Fetch));
    }
}
