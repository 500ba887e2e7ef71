//! Filter → directory query string.
//!
//! The directory search endpoint speaks a Lucene-style grammar:
//!
//! ```text
//! email:"a@b.com" AND identities.connection:"db"
//! (email:"a@b.com" OR user_metadata.favoriteColor:"red")
//! user_metadata.favoriteColor:("red" OR "blue")
//! logins_count:{3 TO *]
//! -(app_metadata.plan:"free")
//! _exists_:last_login
//! ```
//!
//! Clauses of one filter level are joined with ` AND `. A level's joined
//! clauses are parenthesized only when a parent field is in scope and there is
//! more than one clause. Clauses the grammar cannot express produce no output
//! and are reported in [`CompiledQuery::dropped`].

use std::fmt;

use tracing::warn;

use super::ast::{Clause, Filter, Literal, Operand, Operator};

/// Compiler output: the query string plus anything that was left out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledQuery {
    pub query: String,
    pub dropped: Vec<DroppedClause>,
}

impl CompiledQuery {
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedClause {
    /// Operator keyword that was dropped.
    pub key: String,
    /// Field in scope when it was dropped, if any.
    pub field: Option<String>,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Operator has no equivalent in the query grammar.
    UnsupportedOperator,
    /// Field operator used where no field is in scope.
    MissingField,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::UnsupportedOperator => write!(f, "unsupported operator"),
            DropReason::MissingField => write!(f, "operator without a field"),
        }
    }
}

/// Compile `filter` into a query string, discarding diagnostics.
pub fn compile(filter: &Filter) -> String {
    compile_with_diagnostics(filter).query
}

pub fn compile_with_diagnostics(filter: &Filter) -> CompiledQuery {
    let mut compiler = Compiler::default();
    let query = compiler.level(filter, None);
    CompiledQuery {
        query,
        dropped: compiler.dropped,
    }
}

#[derive(Default)]
struct Compiler {
    dropped: Vec<DroppedClause>,
}

impl Compiler {
    fn level(&mut self, filter: &Filter, parent: Option<&str>) -> String {
        let clauses = self.clauses(filter, parent);
        let joined = clauses.join(" AND ");
        if parent.is_some() && clauses.len() > 1 {
            format!("({joined})")
        } else {
            joined
        }
    }

    fn clauses(&mut self, filter: &Filter, parent: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();

        for clause in filter.clauses() {
            match clause {
                Clause::Raw(raw) => {
                    let raw = raw.trim();
                    if raw.contains(char::is_whitespace) {
                        out.push(format!("({raw})"));
                    } else if !raw.is_empty() {
                        out.push(raw.to_string());
                    }
                }
                Clause::Exists(field) => out.push(format!("_exists_:{field}")),
                Clause::Missing(field) => out.push(format!("_missing_:{field}")),
                Clause::And(children) if parent.is_none() => {
                    for child in children {
                        out.extend(self.clauses(child, None));
                    }
                }
                Clause::And(children) => {
                    let parts = self.groups(children, parent);
                    if !parts.is_empty() {
                        out.push(format!("({})", parts.join(" AND ")));
                    }
                }
                Clause::Or(children) => {
                    let parts = self.groups(children, parent);
                    if !parts.is_empty() {
                        let joined = parts.join(" OR ");
                        if parent.is_some() || parts.len() > 1 {
                            out.push(format!("({joined})"));
                        } else {
                            out.push(joined);
                        }
                    }
                }
                Clause::Field { name, operand } => {
                    let path = match parent {
                        Some(parent) => format!("{parent}.{name}"),
                        None => name.clone(),
                    };
                    out.extend(self.operand(&path, operand));
                }
                Clause::Operator(op) => match parent {
                    Some(field) => out.extend(self.operator(field, op)),
                    None => self.record_dropped(op.keyword(), None, DropReason::MissingField),
                },
                Clause::Unsupported { key } => {
                    self.record_dropped(key, parent, DropReason::UnsupportedOperator);
                }
            }
        }

        out
    }

    /// Compile each child filter as one group, parenthesized when it yields
    /// more than one clause.
    fn groups(&mut self, children: &[Filter], parent: Option<&str>) -> Vec<String> {
        children
            .iter()
            .filter_map(|child| {
                let clauses = self.clauses(child, parent);
                match clauses.len() {
                    0 => None,
                    1 => clauses.into_iter().next(),
                    _ => Some(format!("({})", clauses.join(" AND "))),
                }
            })
            .collect()
    }

    fn operand(&mut self, field: &str, operand: &Operand) -> Option<String> {
        match operand {
            Operand::Literal(literal) => Some(format!("{field}:{literal}")),
            Operand::Null => Some(format!(
                "({field}:\"\" OR {field}:0 OR _missing_:{field})"
            )),
            Operand::List(items) => in_list(field, items),
            Operand::Nested(filter) => {
                let compiled = self.level(filter, Some(field));
                (!compiled.is_empty()).then_some(compiled)
            }
        }
    }

    fn operator(&mut self, field: &str, op: &Operator) -> Option<String> {
        match op {
            Operator::Inq(items) => in_list(field, items),
            Operator::Nin(items) => in_list(field, items).map(|clause| format!("-{clause}")),
            Operator::Neq(operand) => self
                .operand(field, operand)
                .map(|clause| format!("-({clause})")),
            Operator::Gt(v) => Some(format!("{field}:{{{} TO *]", bound(v))),
            Operator::Gte(v) => Some(format!("{field}:[{} TO *]", bound(v))),
            Operator::Lt(v) => Some(format!("{field}:[* TO {}}}", bound(v))),
            Operator::Lte(v) => Some(format!("{field}:[* TO {}]", bound(v))),
            Operator::Between(lo, hi) => {
                Some(format!("{field}:[{} TO {}]", bound(lo), bound(hi)))
            }
            Operator::Like(pattern) => Some(format!("{field}:{pattern}")),
            Operator::Nlike(pattern) => Some(format!("-{field}:{pattern}")),
            Operator::Exists(true) | Operator::Missing(false) => Some(format!("_exists_:{field}")),
            Operator::Exists(false) | Operator::Missing(true) => {
                Some(format!("_missing_:{field}"))
            }
        }
    }

    fn record_dropped(&mut self, key: &str, field: Option<&str>, reason: DropReason) {
        warn!(key, field, %reason, "Dropping filter clause the directory cannot express");

        #[cfg(feature = "prometheus")]
        metrics::counter!("directory_filter_dropped_clauses_total", "operator" => key.to_string())
            .increment(1);

        self.dropped.push(DroppedClause {
            key: key.to_string(),
            field: field.map(str::to_string),
            reason,
        });
    }
}

fn in_list(field: &str, items: &[Literal]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let values: Vec<String> = items.iter().map(Literal::to_string).collect();
    Some(format!("{field}:({})", values.join(" OR ")))
}

/// Range bounds are emitted bare unless they hold range or grouping syntax.
fn bound(literal: &Literal) -> String {
    match literal {
        Literal::String(s) if s.chars().all(is_bare_bound_char) && !s.is_empty() => s.clone(),
        other => other.to_string(),
    }
}

fn is_bare_bound_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '@')
}
