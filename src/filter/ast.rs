//! Structured filter tree.
//!
//! Filters arrive as JSON objects in the caller's query language:
//!
//! ```text
//! { "email": "a@b.com" }
//! { "favoriteColor": { "inq": ["red", "blue"] } }
//! { "or": [{ "email": "a@b.com" }, { "loginsCount": { "gt": 3 } }] }
//! { "user_metadata": { "plan": "pro" } }
//! { "$where": "email:*@example.com" }
//! ```
//!
//! [`Filter::from_value`] parses them into a typed tree so the compiler never
//! has to guess at shapes. Operator keys that the directory cannot express are
//! kept as [`Clause::Unsupported`] so the compiler can report them.

use std::fmt;

use serde_json::{Map, Number, Value};

use super::error::{FilterError, FilterResult, kind_of};

/// Maximum nesting depth of a filter tree.
pub const MAX_FILTER_DEPTH: usize = 32;

/// Operator keys recognized by the caller language but not expressible in the
/// directory query grammar.
const UNSUPPORTED_OPERATORS: &[&str] = &["near", "ilike", "nilike", "regexp", "maxDistance"];

/// A scalar operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(Number),
    Bool(bool),
}

impl Literal {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            _ => None,
        }
    }
}

/// Quoted strings, bare numbers and booleans.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", escape_phrase(s)),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Backslashes first, so an escaped quote cannot be unescaped again.
fn escape_phrase(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Value attached to a field name.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Literal),
    Null,
    /// A bare array behaves like `inq`.
    List(Vec<Literal>),
    /// Object without (only) operator keys: its keys extend the field path.
    Nested(Filter),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Inq(Vec<Literal>),
    Nin(Vec<Literal>),
    Neq(Box<Operand>),
    Gt(Literal),
    Gte(Literal),
    Lt(Literal),
    Lte(Literal),
    Between(Literal, Literal),
    Like(Literal),
    Nlike(Literal),
    Exists(bool),
    Missing(bool),
}

impl Operator {
    pub fn keyword(&self) -> &'static str {
        match self {
            Operator::Inq(_) => "inq",
            Operator::Nin(_) => "nin",
            Operator::Neq(_) => "neq",
            Operator::Gt(_) => "gt",
            Operator::Gte(_) => "gte",
            Operator::Lt(_) => "lt",
            Operator::Lte(_) => "lte",
            Operator::Between(..) => "between",
            Operator::Like(_) => "like",
            Operator::Nlike(_) => "nlike",
            Operator::Exists(_) => "exists",
            Operator::Missing(_) => "missing",
        }
    }
}

/// One key/value pair of a filter object.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `$where` / `$search`: inserted verbatim.
    Raw(String),
    /// `$exists` / `_exists_`.
    Exists(String),
    /// `$missing` / `_missing_`.
    Missing(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { name: String, operand: Operand },
    /// Operator applied to the enclosing field.
    Operator(Operator),
    /// Recognized but inexpressible operator, or an unknown `$` key.
    Unsupported { key: String },
}

/// A filter object: an implicit conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse a JSON filter. `null` is the empty filter.
    pub fn from_value(value: &Value) -> FilterResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => parse_object(map, 0),
            other => Err(FilterError::NotAnObject {
                found: kind_of(other),
            }),
        }
    }
}

impl TryFrom<&Value> for Filter {
    type Error = FilterError;

    fn try_from(value: &Value) -> FilterResult<Self> {
        Self::from_value(value)
    }
}

fn parse_object(map: &Map<String, Value>, depth: usize) -> FilterResult<Filter> {
    if depth > MAX_FILTER_DEPTH {
        return Err(FilterError::TooDeep {
            max: MAX_FILTER_DEPTH,
        });
    }

    let clauses = map
        .iter()
        .map(|(key, value)| parse_clause(key, value, depth))
        .collect::<FilterResult<Vec<_>>>()?;
    Ok(Filter::new(clauses))
}

fn parse_clause(key: &str, value: &Value, depth: usize) -> FilterResult<Clause> {
    match key {
        "$where" | "$search" => expect_string(key, value).map(Clause::Raw),
        "$exists" | "_exists_" => expect_string(key, value).map(Clause::Exists),
        "$missing" | "_missing_" => expect_string(key, value).map(Clause::Missing),
        "and" | "or" => {
            let Value::Array(items) = value else {
                return Err(FilterError::LogicalOperand { key: key.into() });
            };
            let children = items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => parse_object(map, depth + 1),
                    _ => Err(FilterError::LogicalOperand { key: key.into() }),
                })
                .collect::<FilterResult<Vec<_>>>()?;
            Ok(if key == "and" {
                Clause::And(children)
            } else {
                Clause::Or(children)
            })
        }
        _ if UNSUPPORTED_OPERATORS.contains(&key) || key.starts_with('$') => {
            Ok(Clause::Unsupported { key: key.into() })
        }
        _ => match parse_operator(key, value, depth)? {
            Some(op) => Ok(Clause::Operator(op)),
            None => Ok(Clause::Field {
                name: key.into(),
                operand: parse_operand(key, value, depth)?,
            }),
        },
    }
}

fn parse_operand(key: &str, value: &Value, depth: usize) -> FilterResult<Operand> {
    match value {
        Value::Null => Ok(Operand::Null),
        Value::Array(items) => literals(key, items).map(Operand::List),
        Value::Object(map) => parse_object(map, depth + 1).map(Operand::Nested),
        scalar => Ok(Operand::Literal(
            Literal::from_value(scalar).ok_or(FilterError::InvalidOperand {
                key: key.into(),
                expected: "a scalar",
            })?,
        )),
    }
}

/// Returns `None` when `key` is not an operator keyword.
fn parse_operator(key: &str, value: &Value, depth: usize) -> FilterResult<Option<Operator>> {
    let op = match key {
        "inq" => Operator::Inq(list_operand(key, value)?),
        "nin" => Operator::Nin(list_operand(key, value)?),
        "neq" => Operator::Neq(Box::new(parse_operand(key, value, depth)?)),
        "gt" => Operator::Gt(scalar_operand(key, value)?),
        "gte" => Operator::Gte(scalar_operand(key, value)?),
        "lt" => Operator::Lt(scalar_operand(key, value)?),
        "lte" => Operator::Lte(scalar_operand(key, value)?),
        "between" => match value {
            Value::Array(items) if items.len() == 2 => {
                let mut bounds = literals(key, items)?.into_iter();
                match (bounds.next(), bounds.next()) {
                    (Some(lo), Some(hi)) => Operator::Between(lo, hi),
                    _ => return Err(between_error(key)),
                }
            }
            _ => return Err(between_error(key)),
        },
        "like" => Operator::Like(pattern_operand(key, value)?),
        "nlike" => Operator::Nlike(pattern_operand(key, value)?),
        "exists" => Operator::Exists(bool_operand(key, value)?),
        "missing" => Operator::Missing(bool_operand(key, value)?),
        _ => return Ok(None),
    };
    Ok(Some(op))
}

fn expect_string(key: &str, value: &Value) -> FilterResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(FilterError::InvalidOperand {
            key: key.into(),
            expected: "a string",
        })
}

fn literals(key: &str, items: &[Value]) -> FilterResult<Vec<Literal>> {
    items
        .iter()
        .map(|item| {
            Literal::from_value(item).ok_or(FilterError::InvalidOperand {
                key: key.into(),
                expected: "an array of scalars",
            })
        })
        .collect()
}

/// A single scalar is accepted as a one-element list; `null` as an empty one.
fn list_operand(key: &str, value: &Value) -> FilterResult<Vec<Literal>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => literals(key, items),
        scalar => scalar_operand(key, scalar).map(|literal| vec![literal]),
    }
}

fn scalar_operand(key: &str, value: &Value) -> FilterResult<Literal> {
    Literal::from_value(value).ok_or(FilterError::InvalidOperand {
        key: key.into(),
        expected: "a scalar",
    })
}

/// Patterns may also arrive wrapped in a one-element array.
fn pattern_operand(key: &str, value: &Value) -> FilterResult<Literal> {
    match value {
        Value::Array(items) if items.len() == 1 => scalar_operand(key, &items[0]),
        other => scalar_operand(key, other),
    }
}

fn bool_operand(key: &str, value: &Value) -> FilterResult<bool> {
    value.as_bool().ok_or(FilterError::InvalidOperand {
        key: key.into(),
        expected: "a boolean",
    })
}

fn between_error(key: &str) -> FilterError {
    FilterError::InvalidOperand {
        key: key.into(),
        expected: "an array of two scalars",
    }
}
