//! Caller query bundles and the directory's request options.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sortable remote fields. Anything else in an order directive is dropped.
pub const SORTABLE_FIELDS: &[&str] = &["email", "connection", "user_id", "created_at", "last_login"];

/// Filter bundle as passed by the host: predicate plus directives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// 1-based, used when `offset` is not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
}

impl QueryFilter {
    pub fn with_where(where_clause: Value) -> Self {
        Self {
            where_clause: Some(where_clause),
            ..Self::default()
        }
    }
}

/// Sort directive: `"email DESC"`, `"email DESC, name"`, or a list of terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Order {
    One(String),
    Many(Vec<String>),
}

impl Order {
    pub fn terms(&self) -> Vec<SortTerm> {
        let raw: Vec<&str> = match self {
            Order::One(s) => s.split(',').collect(),
            Order::Many(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter().filter_map(|t| t.parse().ok()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortTerm {
    pub field: String,
    pub direction: SortDirection,
}

impl FromStr for SortTerm {
    type Err = ();

    /// Accepts `name`, `name ASC` and `name DESC` (direction case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let field = parts.next().ok_or(())?.to_string();
        let direction = match parts.next() {
            None => SortDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            Some(_) => return Err(()),
        };
        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self { field, direction })
    }
}

impl fmt::Display for SortTerm {
    /// Directory form: `field:1` ascending, `field:-1` descending.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        write!(f, "{}:{}", self.field, dir)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    #[default]
    V2,
    V3,
}

/// Request options for the directory's user search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<SearchEngine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u64>,
    /// 0-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_totals: Option<bool>,
}

/// Convert 1-based `offset`/`skip` to a 0-based page. Page 0 is never emitted.
pub fn page_index(offset: Option<u64>, skip: Option<u64>) -> Option<u64> {
    match (offset, skip) {
        (Some(offset), _) if offset > 1 => Some(offset - 1),
        (_, Some(skip)) if skip > 1 => Some(skip - 1),
        _ => None,
    }
}
