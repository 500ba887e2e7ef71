//! Filter language: parsing, compilation to the directory query grammar,
//! scope merging and request options.

mod ast;
mod compile;
mod error;
mod merge;
mod query;

pub use ast::{Clause, Filter, Literal, MAX_FILTER_DEPTH, Operand, Operator};
pub use compile::{CompiledQuery, DropReason, DroppedClause, compile, compile_with_diagnostics};
pub use error::{FilterError, FilterResult};
pub use merge::{DirectiveMerge, FieldsMerge, MergeSpec, is_empty_where, merge_query, merge_where};
pub use query::{
    Order, QueryFilter, SORTABLE_FIELDS, SearchEngine, SortDirection, SortTerm, UserQuery,
    page_index,
};
