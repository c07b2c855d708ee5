//! # Test Doubles
//!
//! [`MockDao`] stands in for a real DAO in unit tests. It answers each call
//! from a queue of expectations for that method, falling back to a default
//! handler, and records every call so tests can assert on dispatch order.
//!
//! [`RecordingConnectionManager`] logs every open, close, begin, commit and
//! rollback.
//!
//! ```rust
//! use data_portal::mock::MockDao;
//! use data_portal::{Connection, Dao, PortalError};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dao = MockDao::new("OrderDao");
//!     dao.expect("fetch").return_ok(json!({"orderKey": 1}));
//!     dao.expect("fetch").return_err(PortalError::NotFound("order 2".into()));
//!
//!     let conn = Connection::none();
//!     assert!(dao.call("fetch", &conn, json!(1)).await.is_ok());
//!     assert!(dao.call("fetch", &conn, json!(2)).await.is_err());
//!
//!     assert_eq!(dao.methods_called(), ["fetch", "fetch"]);
//!     dao.verify();
//! }
//! ```
//!
//! | Need | Use |
//! |------|-----|
//! | one specific answer | `expect(method).return_ok(..)` |
//! | an injected failure | `expect(method).return_err(..)` |
//! | the same answer every time | `on(method, handler)` |
//! | a slow DAO | `delay(method, duration)` |

use crate::connection::{Connection, ConnectionManager};
use crate::dao::Dao;
use crate::error::PortalError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Handler = Arc<dyn Fn(Value) -> Result<Value, PortalError> + Send + Sync>;

/// One recorded DAO call.
#[derive(Debug, Clone, PartialEq)]
pub struct DaoCall {
    pub method: String,
    pub argument: Value,
}

#[derive(Default)]
struct MockState {
    methods: HashSet<String>,
    expectations: HashMap<String, VecDeque<Result<Value, PortalError>>>,
    handlers: HashMap<String, Handler>,
    delays: HashMap<String, Duration>,
    calls: Vec<DaoCall>,
    completed: Vec<String>,
}

/// A DAO answering from expectations and default handlers.
///
/// Clones share state, so a test can keep one handle and register another
/// with the portal.
#[derive(Clone)]
pub struct MockDao {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDao {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues one answer for the next call of `method`.
    pub fn expect(&self, method: &str) -> ExpectationBuilder {
        self.lock().methods.insert(method.to_string());
        ExpectationBuilder {
            method: method.to_string(),
            state: self.state.clone(),
        }
    }

    /// Answers every call of `method` not covered by an expectation.
    pub fn on(
        &self,
        method: &str,
        handler: impl Fn(Value) -> Result<Value, PortalError> + Send + Sync + 'static,
    ) -> &Self {
        let mut state = self.lock();
        state.methods.insert(method.to_string());
        state.handlers.insert(method.to_string(), Arc::new(handler));
        self
    }

    /// Answers `method` with `value` whenever no expectation is queued.
    pub fn returning(&self, method: &str, value: Value) -> &Self {
        self.on(method, move |_| Ok(value.clone()))
    }

    /// Sleeps before answering `method`.
    pub fn delay(&self, method: &str, duration: Duration) -> &Self {
        self.lock().delays.insert(method.to_string(), duration);
        self
    }

    /// Calls in the order they arrived.
    pub fn calls(&self) -> Vec<DaoCall> {
        self.lock().calls.clone()
    }

    pub fn methods_called(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.method.clone()).collect()
    }

    /// Methods in the order their answers were produced.
    pub fn completed(&self) -> Vec<String> {
        self.lock().completed.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    /// Panics if a queued expectation was never consumed.
    pub fn verify(&self) {
        let state = self.lock();
        let remaining: usize = state.expectations.values().map(VecDeque::len).sum();
        if remaining > 0 {
            panic!(
                "Not all expectations of {} were met. {} remaining",
                self.name, remaining
            );
        }
    }
}

#[async_trait]
impl Dao for MockDao {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_method(&self, method: &str) -> bool {
        self.lock().methods.contains(method)
    }

    async fn call(
        &self,
        method: &str,
        _connection: &Connection,
        argument: Value,
    ) -> Result<Value, PortalError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(DaoCall {
                method: method.to_string(),
                argument: argument.clone(),
            });
            state.delays.get(method).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.completed.push(method.to_string());
        if let Some(answer) = state.expectations.get_mut(method).and_then(VecDeque::pop_front) {
            return answer;
        }
        match state.handlers.get(method).cloned() {
            Some(handler) => {
                drop(state);
                handler(argument)
            }
            None => Err(PortalError::Storage(format!(
                "{}: unexpected call to '{method}'",
                self.name
            ))),
        }
    }
}

/// Builder for one queued answer.
pub struct ExpectationBuilder {
    method: String,
    state: Arc<Mutex<MockState>>,
}

impl ExpectationBuilder {
    pub fn return_ok(self, value: Value) {
        self.push(Ok(value));
    }

    pub fn return_err(self, error: PortalError) {
        self.push(Err(error));
    }

    fn push(self, answer: Result<Value, PortalError>) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.expectations.entry(self.method).or_default().push_back(answer);
    }
}

/// One connection-manager call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open(String),
    Close(String),
    Begin(String),
    Commit(String),
    Rollback(String),
}

/// Connection manager that records every call. Each connection carries a
/// sequence number (`u64`).
#[derive(Clone, Default)]
pub struct RecordingConnectionManager {
    events: Arc<Mutex<Vec<ConnectionEvent>>>,
    next: Arc<AtomicU64>,
}

impl RecordingConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, event: ConnectionEvent) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }

    fn connection(&self) -> Connection {
        Connection::new(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ConnectionManager for RecordingConnectionManager {
    async fn open_connection(&self, data_source: &str) -> Result<Connection, PortalError> {
        self.record(ConnectionEvent::Open(data_source.to_string()));
        Ok(self.connection())
    }

    async fn close_connection(&self, data_source: &str, _: Connection) -> Result<(), PortalError> {
        self.record(ConnectionEvent::Close(data_source.to_string()));
        Ok(())
    }

    async fn begin_transaction(&self, data_source: &str) -> Result<Connection, PortalError> {
        self.record(ConnectionEvent::Begin(data_source.to_string()));
        Ok(self.connection())
    }

    async fn commit_transaction(&self, data_source: &str, _: Connection) -> Result<(), PortalError> {
        self.record(ConnectionEvent::Commit(data_source.to_string()));
        Ok(())
    }

    async fn rollback_transaction(
        &self,
        data_source: &str,
        _: Connection,
    ) -> Result<(), PortalError> {
        self.record(ConnectionEvent::Rollback(data_source.to_string()));
        Ok(())
    }
}
