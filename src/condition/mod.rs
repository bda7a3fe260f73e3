//! Condition evaluation
//!
//! Dashboard conditions are small boolean expressions over the cached entity
//! states and an optional user value:
//!
//! ```text
//! state('light.kitchen') === 'on' && user.role == 'admin'
//! ```
//!
//! Only two names are in scope. `state(id)` returns the state string of the
//! first matching record in the current snapshot, or `undefined`. `user` is
//! the value passed by the caller, or `null`. Any other identifier is an
//! error, so expressions cannot reach anything outside that scope.
//!
//! [`ConditionEvaluator::evaluate`] never fails: parse and runtime errors are
//! logged and reported as `false`.

pub mod ast;
pub mod eval;
pub mod parser;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::cache::StateCache;
use crate::types::Snapshot;

pub use ast::Expr;
pub use eval::{Scope, Value};
pub use parser::parse_condition;

/// Condition parse or runtime failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),
}

/// A parsed condition, reusable across snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        let expr = parse_condition(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate to a raw value
    pub fn eval_value(
        &self,
        snapshot: &Snapshot,
        user: Option<&serde_json::Value>,
    ) -> Result<Value, ConditionError> {
        eval::evaluate(&self.expr, &Scope::new(snapshot, user))
    }

    /// Evaluate and coerce to a boolean by truthiness
    pub fn eval(
        &self,
        snapshot: &Snapshot,
        user: Option<&serde_json::Value>,
    ) -> Result<bool, ConditionError> {
        self.eval_value(snapshot, user).map(|v| v.is_truthy())
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Evaluates condition expressions against the state cache
#[derive(Clone)]
pub struct ConditionEvaluator {
    cache: Arc<StateCache>,
}

impl ConditionEvaluator {
    pub fn new(cache: Arc<StateCache>) -> Self {
        Self { cache }
    }

    /// Parse `expression` without evaluating it
    pub fn compile(&self, expression: &str) -> Result<Condition, ConditionError> {
        Condition::compile(expression)
    }

    /// Evaluate `expression`; any failure is logged and yields `false`
    pub fn evaluate(&self, expression: &str, user: Option<&serde_json::Value>) -> bool {
        match self.try_evaluate(expression, user) {
            Ok(result) => result,
            Err(e) => {
                error!(expression, error = %e, "Condition evaluation failed");
                false
            }
        }
    }

    /// Evaluate `expression`, surfacing the failure
    pub fn try_evaluate(
        &self,
        expression: &str,
        user: Option<&serde_json::Value>,
    ) -> Result<bool, ConditionError> {
        let condition = Condition::compile(expression)?;
        // one snapshot for the whole expression
        let snapshot = self.cache.snapshot();
        condition.eval(&snapshot, user)
    }

    /// True when every expression evaluates true; an empty list is true
    pub fn evaluate_all<S: AsRef<str>>(
        &self,
        expressions: &[S],
        user: Option<&serde_json::Value>,
    ) -> bool {
        let snapshot = self.cache.snapshot();
        expressions.iter().all(|expression| {
            let expression = expression.as_ref();
            match Condition::compile(expression).and_then(|c| c.eval(&snapshot, user)) {
                Ok(result) => result,
                Err(e) => {
                    error!(expression, error = %e, "Condition evaluation failed");
                    false
                }
            }
        })
    }
}
