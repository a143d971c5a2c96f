use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::driver::{Driver, HttpResponse};
use crate::engine::result::{EngineError, EngineErrorKind};
use crate::model::data::DataSet;
use crate::model::suite::Procedure;

/// Prefix under which procedure parameters (and loop variables) bind in the
/// shared variable map. Namespaced keys take precedence during placeholder
/// resolution and are inherited across fan-out seeding.
pub const PARAM_NS: &str = "param::";

/// Cooperative cancellation signal threaded into the context and checked at
/// each step boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The mutable state bag threaded through one test run.
///
/// Constructed fresh per test (per data iteration). The variable map is
/// intentionally shared by reference across hooks, steps, and nested
/// procedure calls so earlier writes stay visible; procedure calls apply
/// the save/restore discipline around their parameter bindings.
pub struct ExecutionContext {
    pub variables: BTreeMap<String, Value>,
    pub dataset: Option<DataSet>,
    pub dataset_index: usize,
    /// Suite-local procedure table, consulted before the project table.
    pub procedures: HashMap<String, Procedure>,
    pub last_response: Option<HttpResponse>,
    /// Present only when the running test enabled soft assertions.
    pub soft_failures: Option<Vec<String>>,
    pub cancel: CancelToken,
    pub timeout: Duration,
    session: Option<Box<dyn Driver>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            variables: BTreeMap::new(),
            dataset: None,
            dataset_index: 0,
            procedures: HashMap::new(),
            last_response: None,
            soft_failures: None,
            cancel: CancelToken::new(),
            timeout: Duration::from_secs(30),
            session: None,
        }
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Record a soft assertion failure. Returns false when soft assertions
    /// are not active for this test.
    pub fn record_soft_failure(&mut self, message: impl Into<String>) -> bool {
        match &mut self.soft_failures {
            Some(acc) => {
                acc.push(message.into());
                true
            }
            None => false,
        }
    }

    pub fn soft_assertions_enabled(&self) -> bool {
        self.soft_failures.is_some()
    }

    /// The active driver session, or a driver error when none was created.
    ///
    /// # Errors
    ///
    /// Returns [`EngineErrorKind::Driver`] when no session is attached; the
    /// interpreter attaches one lazily before running driver-dependent steps.
    pub fn driver(&mut self) -> Result<&mut (dyn Driver + 'static), EngineError> {
        self.session.as_deref_mut().ok_or_else(|| {
            EngineError::new(
                EngineErrorKind::Driver,
                "no active driver session for this step",
            )
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn attach_session(&mut self, session: Box<dyn Driver>) {
        self.session = Some(session);
    }

    /// Detach the session so it can outlive this per-test context (one
    /// session spans a whole file run).
    pub fn take_session(&mut self) -> Option<Box<dyn Driver>> {
        self.session.take()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
