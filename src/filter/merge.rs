//! Layering filters on top of each other.
//!
//! Predicates always compose by conjunction, so a scope merged into a caller
//! filter can only narrow the result set. Directives (order, limit, offset)
//! default to first-writer-wins so the caller's choice survives a later merge.

use serde_json::{Map, Value, json};

use super::query::QueryFilter;

/// How a directive present on both sides is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectiveMerge {
    /// Keep the existing value if there is one.
    #[default]
    KeepExisting,
    /// The incoming value replaces the existing one.
    Override,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldsMerge {
    #[default]
    Replace,
    Append,
}

/// Per-directive merge behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSpec {
    pub include: bool,
    /// Nest the existing include under a string include instead of listing both.
    pub nested_include: bool,
    pub fields: FieldsMerge,
    pub order: DirectiveMerge,
    pub limit: DirectiveMerge,
    pub offset: DirectiveMerge,
}

impl Default for MergeSpec {
    fn default() -> Self {
        Self {
            include: true,
            nested_include: false,
            fields: FieldsMerge::default(),
            order: DirectiveMerge::default(),
            limit: DirectiveMerge::default(),
            offset: DirectiveMerge::default(),
        }
    }
}

/// `null` and `{}` are the empty predicate.
pub fn is_empty_where(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Conjunction of two predicates. Empty operands are no-ops.
pub fn merge_where(existing: Value, addition: &Value) -> Value {
    if is_empty_where(addition) {
        return existing;
    }
    if is_empty_where(&existing) {
        return addition.clone();
    }
    json!({ "and": [existing, addition] })
}

/// Merge `update` into `base` according to `spec`.
pub fn merge_query(mut base: QueryFilter, update: &QueryFilter, spec: &MergeSpec) -> QueryFilter {
    if let Some(addition) = &update.where_clause {
        let existing = base.where_clause.take().unwrap_or(Value::Null);
        let merged = merge_where(existing, addition);
        base.where_clause = (!merged.is_null()).then_some(merged);
    }

    if spec.include
        && let Some(incoming) = &update.include
    {
        base.include = Some(match base.include.take() {
            None => incoming.clone(),
            Some(existing) => match incoming {
                Value::String(relation) if spec.nested_include => {
                    let mut nested = Map::new();
                    nested.insert(relation.clone(), existing);
                    Value::Object(nested)
                }
                _ => merge_includes(existing, incoming),
            },
        });
    }

    if let Some(fields) = &update.fields {
        base.fields = Some(match (spec.fields, base.fields.take()) {
            (FieldsMerge::Append, Some(mut existing)) => {
                for field in fields {
                    if !existing.contains(field) {
                        existing.push(field.clone());
                    }
                }
                existing
            }
            _ => fields.clone(),
        });
    }

    merge_directive(&mut base.order, &update.order, spec.order);
    merge_directive(&mut base.limit, &update.limit, spec.limit);
    merge_directive(&mut base.offset, &update.offset, spec.offset);
    merge_directive(&mut base.skip, &update.skip, spec.offset);
    merge_directive(&mut base.totals, &update.totals, DirectiveMerge::KeepExisting);

    base
}

fn merge_directive<T: Clone>(existing: &mut Option<T>, incoming: &Option<T>, how: DirectiveMerge) {
    let Some(incoming) = incoming else {
        return;
    };
    if existing.is_none() || how == DirectiveMerge::Override {
        *existing = Some(incoming.clone());
    }
}

fn merge_includes(existing: Value, incoming: &Value) -> Value {
    let mut merged = into_list(existing);
    for item in into_list(incoming.clone()) {
        if !merged.contains(&item) {
            merged.push(item);
        }
    }
    Value::Array(merged)
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
