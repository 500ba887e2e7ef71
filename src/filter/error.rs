use thiserror::Error;

/// A filter that cannot be parsed into a [`Filter`](super::Filter) tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter must be an object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("`{key}` expects an array of filter objects")]
    LogicalOperand { key: String },

    #[error("`{key}` expects {expected}")]
    InvalidOperand { key: String, expected: &'static str },

    #[error("filter nesting exceeds maximum depth of {max}")]
    TooDeep { max: usize },
}

pub type FilterResult<T> = Result<T, FilterError>;

pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
