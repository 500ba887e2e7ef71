use serde::{Deserialize, Serialize};

use crate::{
    client::TokenScopes,
    filter::QueryFilter,
    mapping::{FieldMapping, MappingScope},
    object::Record,
};

/// Per-model overrides (`[models.<Name>]`).
///
/// Every setting is optional; an absent one falls back to the connector-wide value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Directory connection for this model's users.
    #[serde(default)]
    pub connection: Option<String>,

    /// Restrict queries to `connection`. Disabled if either this or the
    /// connector-wide flag is false.
    #[serde(default)]
    pub connection_query_scope: Option<bool>,

    /// Caller → remote entries layered over the connector tables.
    #[serde(default)]
    pub mapping: Option<FieldMapping>,

    #[serde(default)]
    pub normalize_mapping: Option<FieldMapping>,

    /// Explicit caller → remote table. Takes precedence over `mapping`.
    #[serde(default)]
    pub serialize_mapping: Option<FieldMapping>,

    /// Values applied when the caller leaves a field unset.
    #[serde(default)]
    pub defaults: Record,

    /// Values that always win over caller input.
    #[serde(default)]
    pub attributes: Record,

    #[serde(default)]
    pub query_scope: QueryFilter,

    #[serde(default)]
    pub scopes: Option<TokenScopes>,

    #[serde(default)]
    pub app_metadata: Record,

    #[serde(default)]
    pub user_metadata: Record,
}

impl ModelConfig {
    pub fn mapping_scope(&self) -> MappingScope {
        MappingScope {
            serialize: self.serialize_mapping.clone().or_else(|| self.mapping.clone()),
            normalize: self.normalize_mapping.clone(),
        }
    }
}
