// src/engine/fragment.rs

//! Fragments: the units of work the scheduler dispatches.
//!
//! A fragment binds a body to the [`DriverContext`] of the test that
//! declared it. Its body receives the outcomes of its predecessors and
//! returns a value for its successors. A failing (or panicking) body never
//! escapes: it becomes one ERROR result named `<test>__except<index>` and a
//! [`FragmentOutcome::Failed`] handed to dependents, which must branch on it
//! explicitly.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::dag::DependencyGraph;
use crate::driver::DriverContext;
use crate::engine::runtime::Job;
use crate::result::{TestResult, TestStatus};

/// Graph whose vertices are fragments.
pub type FragmentGraph = DependencyGraph<FragmentSpec>;

/// Shared fragment body.
pub type FragmentFn =
    Arc<dyn Fn(&PreviousValues) -> Result<FragmentValue, FragmentError> + Send + Sync>;

/// Ways a fragment body can stop early.
#[derive(Error, Debug)]
pub enum FragmentError {
    /// Intentional early exit: no result, no value, not an error.
    #[error("fragment aborted")]
    Abort,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<std::io::Error> for FragmentError {
    fn from(err: std::io::Error) -> Self {
        FragmentError::Failed(err.into())
    }
}

/// Opaque value returned by a fragment body.
#[derive(Clone, Default)]
pub struct FragmentValue(Option<Arc<dyn Any + Send + Sync>>);

impl FragmentValue {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the value if it holds a `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for FragmentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("FragmentValue(..)"),
            None => f.write_str("FragmentValue(none)"),
        }
    }
}

/// Captured failure of a fragment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFailure {
    pub uid: String,
    pub message: String,
    /// Full cause chain, one cause per line.
    pub details: String,
}

impl fmt::Display for FragmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.uid, self.message)
    }
}

/// What a collected fragment hands to its dependents.
#[derive(Debug, Clone)]
pub enum FragmentOutcome {
    Value(FragmentValue),
    Aborted,
    Failed(FragmentFailure),
}

impl FragmentOutcome {
    pub fn value(&self) -> Option<&FragmentValue> {
        match self {
            FragmentOutcome::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FragmentFailure> {
        match self {
            FragmentOutcome::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FragmentOutcome::Failed(_))
    }
}

/// Predecessor outcomes as seen by one fragment.
///
/// Keys of sibling fragments (same test) are short names; keys of other
/// tests' fragments are their full uids.
#[derive(Debug, Clone, Default)]
pub struct PreviousValues(BTreeMap<String, FragmentOutcome>);

impl PreviousValues {
    /// Build the view for a fragment of `test_name`.
    pub fn for_test<'a, I>(test_name: &str, predecessors: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, FragmentOutcome)>,
    {
        Self(
            predecessors
                .into_iter()
                .map(|(uid, outcome)| (local_key(test_name, uid).to_string(), outcome))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&FragmentOutcome> {
        self.0.get(key)
    }

    /// Typed value of a successful predecessor.
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key)?.value()?.get::<T>()
    }

    pub fn failure(&self, key: &str) -> Option<&FragmentFailure> {
        self.get(key)?.failure()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FragmentOutcome)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Strip the `<test>.` prefix from a uid owned by `test_name`.
pub fn local_key<'a>(test_name: &str, uid: &'a str) -> &'a str {
    uid.strip_prefix(test_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(uid)
}

/// Vertex payload: the owning test's context plus the body to run.
#[derive(Clone)]
pub struct FragmentSpec {
    pub context: Arc<DriverContext>,
    pub body: FragmentFn,
}

impl FragmentSpec {
    pub fn new<F>(context: Arc<DriverContext>, body: F) -> Self
    where
        F: Fn(&PreviousValues) -> Result<FragmentValue, FragmentError> + Send + Sync + 'static,
    {
        Self {
            context,
            body: Arc::new(body),
        }
    }
}

impl fmt::Debug for FragmentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentSpec")
            .field("test", &self.context.test_name())
            .finish_non_exhaustive()
    }
}

/// One dispatched fragment. Lives from dispatch until its collection.
pub struct Fragment {
    uid: String,
    index: usize,
    context: Arc<DriverContext>,
    body: FragmentFn,
    previous_values: PreviousValues,
    outcome: FragmentOutcome,
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("uid", &self.uid)
            .field("index", &self.index)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl Fragment {
    pub fn new(uid: &str, index: usize, spec: &FragmentSpec, previous_values: PreviousValues) -> Self {
        Self {
            uid: uid.to_string(),
            index,
            context: Arc::clone(&spec.context),
            body: Arc::clone(&spec.body),
            previous_values,
            outcome: FragmentOutcome::Value(FragmentValue::none()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn context(&self) -> &Arc<DriverContext> {
        &self.context
    }

    pub fn previous_values(&self) -> &PreviousValues {
        &self.previous_values
    }

    /// Outcome of the last [`Fragment::execute`] call.
    pub fn outcome(&self) -> &FragmentOutcome {
        &self.outcome
    }

    /// Run the body, containing any failure.
    pub fn execute(&mut self) {
        let body = Arc::clone(&self.body);
        let previous = &self.previous_values;
        let result = catch_unwind(AssertUnwindSafe(|| body(previous)));

        self.outcome = match result {
            Ok(Ok(value)) => FragmentOutcome::Value(value),
            Ok(Err(FragmentError::Abort)) => {
                debug!(uid = %self.uid, "fragment aborted");
                FragmentOutcome::Aborted
            }
            Ok(Err(FragmentError::Failed(err))) => {
                let details = err
                    .chain()
                    .map(|cause| cause.to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                self.contain(err.to_string(), details)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.contain(format!("panic: {message}"), message)
            }
        };
    }

    fn contain(&self, message: String, details: String) -> FragmentOutcome {
        error!(uid = %self.uid, error = %message, "got exception in fragment");

        let test_name = format!("{}__except{}", self.context.test_name(), self.index);
        self.context.push_result(
            TestResult::new(test_name, TestStatus::Error)
                .with_msg(message.clone())
                .with_log(details.clone())
                .with_env(self.context.test_env().clone()),
        );

        FragmentOutcome::Failed(FragmentFailure {
            uid: self.uid.clone(),
            message,
            details,
        })
    }
}

impl Job for Fragment {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn run(&mut self) {
        self.execute();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
