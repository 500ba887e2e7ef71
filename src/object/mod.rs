//! Object substrate for records and filters.
//!
//! Records and filters cross the connector boundary as JSON objects. This
//! module provides the two primitives every higher layer is built on:
//!
//! - [`path`]: read and write values at dotted paths (`user_metadata.color`)
//!   and copy values between paths according to a mapping table.
//! - [`transform`]: pure, depth-first rewrites of a JSON tree (key renaming,
//!   per-node value replacement). Inputs are never mutated.

pub mod path;
pub mod transform;

pub use path::{extract, get, merge_deep, set};
pub use transform::{Node, rewrite_keys, rewrite_keys_with, visit};

/// A JSON object record, either in caller (internal) or remote (external) shape.
pub type Record = serde_json::Map<String, serde_json::Value>;
