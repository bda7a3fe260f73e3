//! Condition interpreter
//!
//! Values and coercions follow JavaScript closely enough that expressions
//! written for a browser dashboard keep their meaning: loose equality
//! converts between numbers, numeric strings and booleans, relational
//! operators compare numeric strings as numbers, and `&&`/`||` yield one of
//! their operands.

use std::cmp::Ordering;

use super::ast::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};
use super::ConditionError;
use crate::types::Snapshot;

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<serde_json::Value>),
    Object(serde_json::Map<String, serde_json::Value>),
    /// The built-in `state` lookup function
    StateLookup,
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.clone()),
            serde_json::Value::Object(map) => Value::Object(map.clone()),
        }
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::StateLookup => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::StateLookup => "function",
        }
    }

    /// Numeric conversion; NaN when the value has no numeric reading
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Undefined | Value::Array(_) | Value::Object(_) | Value::StateLookup => f64::NAN,
        }
    }

    fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            || matches!(
                (self, other),
                (Value::Array(_), Value::Object(_)) | (Value::Object(_), Value::Array(_))
            )
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'));
    if !numeric {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// `===`
pub fn strict_equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a == b,
        (Value::StateLookup, Value::StateLookup) => true,
        _ => false,
    }
}

/// `==`
pub fn loose_equals(lhs: &Value, rhs: &Value) -> bool {
    if lhs.same_type(rhs) {
        return strict_equals(lhs, rhs);
    }
    match (lhs, rhs) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            *n == string_to_number(s)
        }
        (Value::Bool(_), other) => loose_equals(&Value::Number(lhs.to_number()), other),
        (other, Value::Bool(_)) => loose_equals(other, &Value::Number(rhs.to_number())),
        _ => false,
    }
}

fn relational(op: BinaryOp, lhs: &Value, rhs: &Value) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

/// Bindings visible to an expression: `state` and `user`, nothing else
pub struct Scope<'a> {
    snapshot: &'a Snapshot,
    user: Option<&'a serde_json::Value>,
}

impl<'a> Scope<'a> {
    pub fn new(snapshot: &'a Snapshot, user: Option<&'a serde_json::Value>) -> Self {
        Self { snapshot, user }
    }

    fn resolve(&self, name: &str) -> Result<Value, ConditionError> {
        match name {
            "state" => Ok(Value::StateLookup),
            "user" => Ok(self.user.map(Value::from).unwrap_or(Value::Null)),
            _ => Err(ConditionError::Reference(name.to_string())),
        }
    }

    fn lookup_state(&self, id: &Value) -> Value {
        match id {
            Value::String(id) => self
                .snapshot
                .state_of(id)
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }
}

/// Evaluate `expr` in `scope`
pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(literal) => Ok(match literal {
            Literal::Undefined => Value::Undefined,
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }),

        Expr::Ident(name) => scope.resolve(name),

        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Neg => Value::Number(-value.to_number()),
            })
        }

        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, scope)?;
            let rhs = evaluate(rhs, scope)?;
            Ok(Value::Bool(match op {
                BinaryOp::StrictEq => strict_equals(&lhs, &rhs),
                BinaryOp::StrictNe => !strict_equals(&lhs, &rhs),
                BinaryOp::LooseEq => loose_equals(&lhs, &rhs),
                BinaryOp::LooseNe => !loose_equals(&lhs, &rhs),
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    relational(*op, &lhs, &rhs)
                }
            }))
        }

        Expr::Logical { op, lhs, rhs } => {
            let lhs = evaluate(lhs, scope)?;
            match (op, lhs.is_truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(lhs),
                _ => evaluate(rhs, scope),
            }
        }

        Expr::Call { callee, args } => {
            let callee = evaluate(callee, scope)?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            match callee {
                Value::StateLookup => Ok(args
                    .first()
                    .map(|id| scope.lookup_state(id))
                    .unwrap_or(Value::Undefined)),
                other => Err(ConditionError::Type(format!(
                    "{} is not a function",
                    other.type_name()
                ))),
            }
        }

        Expr::Member { object, property } => {
            let object = evaluate(object, scope)?;
            let property = evaluate(property, scope)?;
            member(&object, &property)
        }
    }
}

fn property_key(property: &Value) -> String {
    match property {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(*n),
        other => other.type_name().to_string(),
    }
}

fn member(object: &Value, property: &Value) -> Result<Value, ConditionError> {
    let key = property_key(property);
    match object {
        Value::Undefined | Value::Null => Err(ConditionError::Type(format!(
            "cannot read properties of {} (reading '{}')",
            object.type_name(),
            key
        ))),
        Value::Object(map) => Ok(map.get(&key).map(Value::from).unwrap_or(Value::Undefined)),
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            Ok(key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .map(Value::from)
                .unwrap_or(Value::Undefined))
        }
        Value::String(s) if key == "length" => Ok(Value::Number(s.encode_utf16().count() as f64)),
        _ => Ok(Value::Undefined),
    }
}
