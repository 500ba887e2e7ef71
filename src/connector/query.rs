//! Caller filters → directory search requests.

use serde_json::{Map, Value, json};
use tracing::debug;

use super::ConnectorSettings;
use crate::{
    filter::{
        CompiledQuery, Filter, FilterResult, Order, QueryFilter, SORTABLE_FIELDS, UserQuery,
        compile_with_diagnostics, is_empty_where, merge_where, page_index,
    },
    mapping::MappingDirection,
};

const FIELD_VALUED_KEYS: [&str; 4] = ["$exists", "_exists_", "$missing", "_missing_"];

impl ConnectorSettings {
    /// Whether queries for `model` are pinned to its connection.
    fn scopes_connection(&self, model: &str) -> bool {
        self.connection_query_scope
            && self
                .model(model)
                .and_then(|m| m.connection_query_scope)
                .unwrap_or(true)
    }

    /// The caller predicate narrowed by the configured query scopes, in caller
    /// field names.
    pub fn scoped_where(&self, model: &str, where_clause: Option<&Value>) -> Value {
        let mut merged = where_clause.cloned().unwrap_or(Value::Null);
        if let Some(scope) = &self.query_scope {
            merged = merge_where(merged, scope);
        }
        if let Some(scope) = self.model(model).and_then(|m| m.query_scope.as_ref()) {
            merged = merge_where(merged, scope);
        }
        if self.scopes_connection(model) {
            merged = merge_where(merged, &json!({ "connection": self.connection(model) }));
        }
        merged
    }

    /// Scope, alias, rename and compile `where_clause`. `None` when nothing
    /// constrains the search.
    pub fn compile_where(
        &self,
        model: &str,
        where_clause: Option<&Value>,
    ) -> FilterResult<Option<CompiledQuery>> {
        let scoped = self.scoped_where(model, where_clause);
        if is_empty_where(&scoped) {
            return Ok(None);
        }

        let table = self.mapper().resolve(model, MappingDirection::Serialize);
        let remote = rename_fields(&scoped, &|key, value| table.apply(alias(key, value)));
        let compiled = compile_with_diagnostics(&Filter::from_value(&remote)?);

        debug!(
            model,
            q = %compiled.query,
            dropped = compiled.dropped.len(),
            "Compiled directory query"
        );
        Ok((!compiled.is_empty()).then_some(compiled))
    }

    /// Query string for `where_clause`, see [`Self::compile_where`].
    pub fn build_where(&self, model: &str, where_clause: Option<&Value>) -> FilterResult<Option<String>> {
        Ok(self.compile_where(model, where_clause)?.map(|c| c.query))
    }

    /// First sortable term of `order`, in remote names.
    pub fn build_order(&self, model: &str, order: &Order) -> Option<String> {
        order.terms().into_iter().find_map(|mut term| {
            term.field = self.mapper().serialize_field(model, &term.field);
            SORTABLE_FIELDS
                .contains(&term.field.as_str())
                .then(|| term.to_string())
        })
    }

    pub fn build_query(&self, model: &str, filter: &QueryFilter) -> FilterResult<UserQuery> {
        let q = self.build_where(model, filter.where_clause.as_ref())?;
        Ok(UserQuery {
            search_engine: q.as_ref().map(|_| self.search_engine),
            q,
            per_page: filter.limit,
            page: page_index(filter.offset, filter.skip),
            fields: filter
                .fields
                .as_ref()
                .filter(|fields| !fields.is_empty())
                .map(|fields| self.mapper().serialize_fields(model, fields).join(",")),
            sort: filter.order.as_ref().and_then(|order| self.build_order(model, order)),
            include_totals: filter.totals,
        })
    }
}

/// Directory spelling of a caller key. Ids that look like emails search by email.
fn alias<'k>(key: &'k str, value: &Value) -> &'k str {
    match key {
        "id" if value.as_str().is_some_and(|id| id.find('@').is_some_and(|at| at > 0)) => "email",
        "id" => "user_id",
        "connection" => "identities.connection",
        other => other,
    }
}

/// Rename the field keys of a where object. Logical groups are walked, field
/// operands are left alone, and existence checks have their field value renamed.
fn rename_fields(value: &Value, rename: &dyn Fn(&str, &Value) -> String) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };

    let mut renamed = Map::new();
    let mut collisions = Vec::new();

    for (key, operand) in map {
        let (key, operand) = match key.as_str() {
            "and" | "or" => {
                let operand = match operand {
                    Value::Array(items) => {
                        Value::Array(items.iter().map(|item| rename_fields(item, rename)).collect())
                    }
                    other => other.clone(),
                };
                (key.clone(), operand)
            }
            k if FIELD_VALUED_KEYS.contains(&k) => {
                let operand = match operand {
                    Value::String(field) => Value::String(rename(field, &Value::Null)),
                    other => other.clone(),
                };
                (key.clone(), operand)
            }
            k if k.starts_with('$') => (key.clone(), operand.clone()),
            k => (rename(k, operand), operand.clone()),
        };

        // Two caller keys naming one remote field must both constrain it.
        if renamed.contains_key(&key) {
            let mut clause = Map::new();
            clause.insert(key, operand);
            collisions.push(Value::Object(clause));
        } else {
            renamed.insert(key, operand);
        }
    }

    if !collisions.is_empty() {
        match renamed.get_mut("and") {
            Some(Value::Array(items)) => items.extend(collisions),
            _ => {
                if let Some(existing) = renamed.remove("and") {
                    let mut clause = Map::new();
                    clause.insert("and".into(), existing);
                    collisions.push(Value::Object(clause));
                }
                renamed.insert("and".into(), Value::Array(collisions));
            }
        }
    }

    Value::Object(renamed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::ConnectorConfig, connector::settings::tests::test_config, filter::SearchEngine,
    };

    fn settings() -> ConnectorSettings {
        ConnectorSettings::from_config(&test_config()).unwrap()
    }

    fn unscoped() -> ConnectorSettings {
        ConnectorSettings::from_config(&ConnectorConfig {
            connection_query_scope: false,
            ..test_config()
        })
        .unwrap()
    }

    #[test]
    fn test_connection_scope_is_appended() {
        let q = settings().build_where("User", Some(&json!({ "email": "a@b.com" }))).unwrap();
        assert_eq!(
            q.as_deref(),
            Some(r#"email:"a@b.com" AND identities.connection:"Username-Password-Authentication""#)
        );
    }

    #[test]
    fn test_model_scope_and_connection() {
        let q = settings().build_where("Partner", None).unwrap();
        assert_eq!(
            q.as_deref(),
            Some(r#"app_metadata.tier:"gold" AND identities.connection:"partners""#)
        );
    }

    #[test]
    fn test_model_can_disable_connection_scope() {
        let mut config = test_config();
        if let Some(partner) = config.models.get_mut("Partner") {
            partner.connection_query_scope = Some(false);
        }
        let settings = ConnectorSettings::from_config(&config).unwrap();
        assert_eq!(
            settings.build_where("Partner", None).unwrap().as_deref(),
            Some(r#"app_metadata.tier:"gold""#)
        );
        assert!(settings.build_where("User", None).unwrap().is_some());
    }

    #[test]
    fn test_empty_where_yields_no_query() {
        assert_eq!(unscoped().build_where("User", None).unwrap(), None);
        assert_eq!(unscoped().build_where("User", Some(&json!({}))).unwrap(), None);
    }

    #[test]
    fn test_id_aliases() {
        let settings = unscoped();
        assert_eq!(
            settings.build_where("User", Some(&json!({ "id": "auth0|1" }))).unwrap().as_deref(),
            Some(r#"user_id:"auth0|1""#)
        );
        assert_eq!(
            settings.build_where("User", Some(&json!({ "id": "a@b.com" }))).unwrap().as_deref(),
            Some(r#"email:"a@b.com""#)
        );
        assert_eq!(
            settings
                .build_where("User", Some(&json!({ "id": { "inq": ["a", "b"] } })))
                .unwrap()
                .as_deref(),
            Some(r#"user_id:("a" OR "b")"#)
        );
    }

    #[test]
    fn test_mapped_fields_in_groups() {
        let q = unscoped()
            .build_where(
                "User",
                Some(&json!({ "or": [{ "email": "a@b.com" }, { "favoriteColor": "red" }] })),
            )
            .unwrap();
        assert_eq!(
            q.as_deref(),
            Some(r#"(email:"a@b.com" OR user_metadata.favoriteColor:"red")"#)
        );
    }

    #[test]
    fn test_exists_field_is_renamed() {
        let q = unscoped()
            .build_where("User", Some(&json!({ "$exists": "favoriteColor" })))
            .unwrap();
        assert_eq!(q.as_deref(), Some("_exists_:user_metadata.favoriteColor"));
    }

    #[test]
    fn test_colliding_keys_both_constrain() {
        let q = unscoped()
            .build_where("User", Some(&json!({ "id": "a@b.com", "email": "c@d.com" })))
            .unwrap();
        assert_eq!(q.as_deref(), Some(r#"email:"a@b.com" AND email:"c@d.com""#));

        let q = unscoped()
            .build_where(
                "User",
                Some(&json!({ "and": [{ "name": "A" }], "id": "auth0|1", "user_id": "auth0|2" })),
            )
            .unwrap();
        assert_eq!(
            q.as_deref(),
            Some(r#"name:"A" AND user_id:"auth0|2" AND user_id:"auth0|1""#)
        );
    }

    #[test]
    fn test_trailing_backslash_keeps_connection_scope() {
        let q = settings().build_where("User", Some(&json!({ "name": "C:\\" }))).unwrap();
        assert_eq!(
            q.as_deref(),
            Some(r#"name:"C:\\" AND identities.connection:"Username-Password-Authentication""#)
        );
    }

    #[test]
    fn test_invalid_where_is_an_error() {
        assert!(unscoped().build_where("User", Some(&json!([1, 2]))).is_err());
    }

    #[test]
    fn test_build_query() {
        let filter: QueryFilter = serde_json::from_value(json!({
            "where": { "favoriteColor": "red" },
            "limit": 10,
            "offset": 3,
            "fields": ["id", "email", "favoriteColor"],
            "order": "name ASC, email DESC",
            "totals": true
        }))
        .unwrap();

        let query = unscoped().build_query("User", &filter).unwrap();
        assert_eq!(query.q.as_deref(), Some(r#"user_metadata.favoriteColor:"red""#));
        assert_eq!(query.search_engine, Some(SearchEngine::V2));
        assert_eq!(query.per_page, Some(10));
        assert_eq!(query.page, Some(2));
        assert_eq!(
            query.fields.as_deref(),
            Some("user_id,email,user_metadata.favoriteColor")
        );
        assert_eq!(query.sort.as_deref(), Some("email:-1"));
        assert_eq!(query.include_totals, Some(true));
    }

    #[test]
    fn test_build_query_without_predicate_omits_engine() {
        let query = unscoped().build_query("User", &QueryFilter::default()).unwrap();
        assert_eq!(query, UserQuery::default());
    }

    #[test]
    fn test_build_order_maps_names() {
        let order = Order::Many(vec!["createdAt DESC".into()]);
        assert_eq!(
            settings().build_order("User", &order).as_deref(),
            Some("created_at:-1")
        );
        assert_eq!(settings().build_order("User", &Order::One("name".into())), None);
    }
}
