//! # Rules
//!
//! The data portal asks a [`RuleManager`] two kinds of questions:
//!
//! - **Authorization**: may the current user read or write a property, fetch,
//!   create, update or remove the object, or execute a named method?
//! - **Validation**: which rules does the current property set break? Broken
//!   rules are collected into a [`BrokenRuleList`].
//!
//! [`Rules`] is a small table-driven implementation good enough for most model
//! types. Anything smarter can implement [`RuleManager`] directly.

use crate::property::{PropertyDescriptor, PropertyRead};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Something a user may or may not be allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorizationAction {
    ReadProperty(String),
    WriteProperty(String),
    FetchObject,
    CreateObject,
    UpdateObject,
    RemoveObject,
    ExecuteMethod(String),
}

impl fmt::Display for AuthorizationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationAction::ReadProperty(p) => write!(f, "read property '{p}'"),
            AuthorizationAction::WriteProperty(p) => write!(f, "write property '{p}'"),
            AuthorizationAction::FetchObject => f.write_str("fetch object"),
            AuthorizationAction::CreateObject => f.write_str("create object"),
            AuthorizationAction::UpdateObject => f.write_str("update object"),
            AuthorizationAction::RemoveObject => f.write_str("remove object"),
            AuthorizationAction::ExecuteMethod(m) => write!(f, "execute method '{m}'"),
        }
    }
}

/// Everything an authorization rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationContext<'a> {
    pub model: &'a str,
    pub action: &'a AuthorizationAction,
    pub user: Option<&'a str>,
    pub locale: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleSeverity {
    Information,
    Warning,
    Error,
}

/// One rule violation.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokenRule {
    pub property: String,
    pub message: String,
    pub severity: RuleSeverity,
}

/// Broken rules of one validation pass, grouped by property name.
#[derive(Debug, Clone, Default)]
pub struct BrokenRuleList {
    by_property: BTreeMap<String, Vec<BrokenRule>>,
}

impl BrokenRuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: &str, message: impl Into<String>, severity: RuleSeverity) {
        self.by_property
            .entry(property.to_string())
            .or_default()
            .push(BrokenRule {
                property: property.to_string(),
                message: message.into(),
                severity,
            });
    }

    pub fn clear(&mut self) {
        self.by_property.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_property.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_property.values().map(Vec::len).sum()
    }

    pub fn for_property(&self, property: &str) -> &[BrokenRule] {
        self.by_property.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BrokenRule> {
        self.by_property.values().flatten()
    }
}

/// Rule engine contract used by the data portal.
pub trait RuleManager: Send + Sync {
    fn has_permission(&self, context: &AuthorizationContext<'_>) -> bool;

    /// Validates one property, appending violations to `broken`.
    fn validate(
        &self,
        property: &PropertyDescriptor,
        values: &dyn PropertyRead,
        broken: &mut BrokenRuleList,
    );
}

pub type AuthorizationRule = Arc<dyn Fn(&AuthorizationContext<'_>) -> bool + Send + Sync>;

/// A validation rule returns the violation message, if any.
pub type ValidationRule =
    Arc<dyn Fn(Option<&Value>, &dyn PropertyRead) -> Option<(String, RuleSeverity)> + Send + Sync>;

/// Table-driven [`RuleManager`]. Actions without a rule are allowed.
#[derive(Default, Clone)]
pub struct Rules {
    authorization: HashMap<AuthorizationAction, Vec<AuthorizationRule>>,
    validation: HashMap<String, Vec<ValidationRule>>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize(
        mut self,
        action: AuthorizationAction,
        rule: impl Fn(&AuthorizationContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.authorization.entry(action).or_default().push(Arc::new(rule));
        self
    }

    pub fn deny(self, action: AuthorizationAction) -> Self {
        self.authorize(action, |_| false)
    }

    pub fn allow_users<I, S>(self, action: AuthorizationAction, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let users: Vec<String> = users.into_iter().map(Into::into).collect();
        self.authorize(action, move |ctx| {
            ctx.user.is_some_and(|user| users.iter().any(|u| u == user))
        })
    }

    pub fn check(
        mut self,
        property: impl Into<String>,
        rule: impl Fn(Option<&Value>, &dyn PropertyRead) -> Option<(String, RuleSeverity)>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.validation.entry(property.into()).or_default().push(Arc::new(rule));
        self
    }

    pub fn required(self, property: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        self.check(property, move |value, _| {
            let missing = match value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            missing.then(|| (message.clone(), RuleSeverity::Error))
        })
    }

    pub fn max_length(
        self,
        property: impl Into<String>,
        max: usize,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        self.check(property, move |value, _| match value {
            Some(Value::String(s)) if s.chars().count() > max => {
                Some((message.clone(), RuleSeverity::Error))
            }
            _ => None,
        })
    }

    pub fn min_value(self, property: impl Into<String>, min: f64, message: impl Into<String>) -> Self {
        let message = message.into();
        self.check(property, move |value, _| match value.and_then(Value::as_f64) {
            Some(n) if n < min => Some((message.clone(), RuleSeverity::Error)),
            _ => None,
        })
    }
}

impl RuleManager for Rules {
    fn has_permission(&self, context: &AuthorizationContext<'_>) -> bool {
        self.authorization
            .get(context.action)
            .map(|rules| rules.iter().all(|rule| rule(context)))
            .unwrap_or(true)
    }

    fn validate(
        &self,
        property: &PropertyDescriptor,
        values: &dyn PropertyRead,
        broken: &mut BrokenRuleList,
    ) {
        let Some(rules) = self.validation.get(property.name()) else {
            return;
        };
        let value = values.read(property.name());
        for rule in rules {
            if let Some((message, severity)) = rule(value, values) {
                broken.add(property.name(), message, severity);
            }
        }
    }
}

impl fmt::Debug for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rules")
            .field("authorization", &self.authorization.keys().collect::<Vec<_>>())
            .field("validation", &self.validation.keys().collect::<Vec<_>>())
            .finish()
    }
}
