//! Outbound record construction and inbound reconstruction.
//!
//! Outbound (serialize), lowest precedence first:
//!
//! 1. connector defaults, then model defaults (only for unset fields)
//! 2. caller record
//! 3. connector enforced attributes, then model enforced attributes
//!
//! The merged record is mapped to remote names. Metadata buckets
//! (`app_metadata`, `user_metadata`) are then merged separately from the stored
//! record, the caller, the configured buckets and the call options. Finally
//! the record is restricted to the outbound whitelist, then to `omit`/`pick`.
//!
//! Inbound (normalize) maps remote names back and coerces timestamp fields.

mod timestamp;

use std::{fmt, sync::Arc};

use serde::Deserialize;
use serde_json::Value;

pub use timestamp::{coerce_timestamp, timestamp};

use crate::{
    client::TokenScopes,
    mapping::FieldMapping,
    object::{Record, extract, merge_deep, visit},
};

/// Remote metadata namespaces merged key by key rather than replaced.
pub const METADATA_BUCKETS: [&str; 2] = ["app_metadata", "user_metadata"];

/// Computes defaults or enforced attributes from `(model, caller data, options)`.
pub type ComputeFn = dyn Fn(&str, &Record, &SerializeOptions) -> Record + Send + Sync;

/// A configured record: fixed, or computed per call.
#[derive(Clone)]
pub enum AttributeSource {
    Static(Record),
    Computed(Arc<ComputeFn>),
}

impl AttributeSource {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&str, &Record, &SerializeOptions) -> Record + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self, model: &str, data: &Record, options: &SerializeOptions) -> Record {
        match self {
            AttributeSource::Static(record) => record.clone(),
            AttributeSource::Computed(f) => f(model, data, options),
        }
    }

    /// `None` for an empty static record.
    pub fn from_record(record: Record) -> Option<Self> {
        (!record.is_empty()).then_some(Self::Static(record))
    }
}

impl fmt::Debug for AttributeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeSource::Static(record) => f.debug_tuple("Static").field(record).finish(),
            AttributeSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Attribute sources of one scope (connector-wide or one model).
#[derive(Debug, Clone, Default)]
pub struct AttributeSources {
    pub defaults: Option<AttributeSource>,
    pub attributes: Option<AttributeSource>,
    pub app_metadata: Record,
    pub user_metadata: Record,
}

impl AttributeSources {
    fn bucket(&self, name: &str) -> Option<&Record> {
        match name {
            "app_metadata" => Some(&self.app_metadata),
            "user_metadata" => Some(&self.user_metadata),
            _ => None,
        }
    }
}

/// Per-call serialization options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SerializeOptions {
    /// Apply configured defaults. Off for partial updates.
    #[serde(default = "default_true")]
    pub serialize_defaults: bool,
    #[serde(default)]
    pub omit: Option<Vec<String>>,
    #[serde(default)]
    pub pick: Option<Vec<String>>,
    /// Token scopes for this call, layered over the configured ones.
    #[serde(default)]
    pub scopes: Option<TokenScopes>,
    #[serde(default, rename = "app_metadata")]
    pub app_metadata: Option<Record>,
    #[serde(default, rename = "user_metadata")]
    pub user_metadata: Option<Record>,
    /// Stored record (caller shape) seeding the metadata buckets.
    #[serde(default)]
    pub instance_data: Option<Record>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            serialize_defaults: true,
            omit: None,
            pick: None,
            scopes: None,
            app_metadata: None,
            user_metadata: None,
            instance_data: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl SerializeOptions {
    fn bucket(&self, name: &str) -> Option<&Record> {
        match name {
            "app_metadata" => self.app_metadata.as_ref(),
            "user_metadata" => self.user_metadata.as_ref(),
            _ => None,
        }
    }
}

/// Builds outbound records for one model.
#[derive(Debug, Clone, Copy)]
pub struct Serializer<'a> {
    pub model: &'a str,
    pub connector: &'a AttributeSources,
    pub overrides: Option<&'a AttributeSources>,
    /// Caller → remote table.
    pub mapping: &'a FieldMapping,
    pub whitelist: &'a [String],
}

impl Serializer<'_> {
    pub fn serialize(&self, data: &Record, options: &SerializeOptions) -> Record {
        let mut record = Record::new();

        if options.serialize_defaults {
            for source in self.scopes().filter_map(|s| s.defaults.as_ref()) {
                record.extend(source.resolve(self.model, data, options));
            }
        }
        record.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));

        for source in self.scopes().filter_map(|s| s.attributes.as_ref()) {
            merge_deep(&mut record, &source.resolve(self.model, data, options));
        }

        let mut mapped = extract(&record, self.mapping.iter(), true);

        let prior = options
            .instance_data
            .as_ref()
            .map(|instance| extract(instance, self.mapping.iter(), true));

        for name in METADATA_BUCKETS {
            let mut bucket = Record::new();
            let layers = [
                prior.as_ref().and_then(|p| object_at(p, name)),
                object_at(&mapped, name),
                self.connector.bucket(name),
                self.overrides.and_then(|o| o.bucket(name)),
                options.bucket(name),
            ];
            for layer in layers.into_iter().flatten() {
                bucket.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            if bucket.is_empty() {
                mapped.remove(name);
            } else {
                mapped.insert(name.to_string(), Value::Object(bucket));
            }
        }

        mapped.retain(|key, _| self.whitelist.iter().any(|allowed| allowed == key));
        if let Some(omit) = &options.omit {
            mapped.retain(|key, _| !omit.contains(key));
        }
        if let Some(pick) = &options.pick {
            mapped.retain(|key, _| pick.contains(key));
        }

        mapped
    }

    fn scopes(&self) -> impl Iterator<Item = &AttributeSources> {
        std::iter::once(self.connector).chain(self.overrides)
    }
}

fn object_at<'r>(record: &'r Record, key: &str) -> Option<&'r Record> {
    record.get(key).and_then(Value::as_object)
}

/// Rebuilds caller-shaped records for one model.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    /// Remote → caller table.
    pub mapping: &'a FieldMapping,
    pub date_fields: &'a [String],
}

impl Normalizer<'_> {
    /// Only mapped fields survive.
    pub fn normalize(&self, external: &Record) -> Record {
        let mapped = Value::Object(extract(external, self.mapping.iter(), false));
        let coerced = visit(&mapped, |node, value| {
            let key = node.key()?;
            self.date_fields
                .iter()
                .any(|field| field == key)
                .then(|| coerce_timestamp(value))
        });

        match coerced {
            Value::Object(record) => record,
            _ => Record::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::{default_date_fields, default_outbound_attributes};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn table() -> FieldMapping {
        FieldMapping::builtin().extended(&FieldMapping::from_pairs([
            ("favoriteColor", "user_metadata.favoriteColor"),
            ("demoUser", "app_metadata.demoUser"),
        ]))
    }

    struct Fixture {
        connector: AttributeSources,
        model: Option<AttributeSources>,
        mapping: FieldMapping,
        whitelist: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                connector: AttributeSources::default(),
                model: None,
                mapping: table(),
                whitelist: default_outbound_attributes(),
            }
        }

        fn serializer(&self) -> Serializer<'_> {
            Serializer {
                model: "User",
                connector: &self.connector,
                overrides: self.model.as_ref(),
                mapping: &self.mapping,
                whitelist: &self.whitelist,
            }
        }
    }

    #[test]
    fn test_maps_fields_and_buckets() {
        let fixture = Fixture::new();
        let out = fixture.serializer().serialize(
            &record(json!({ "email": "a@b.com", "favoriteColor": "red", "emailVerified": true })),
            &SerializeOptions::default(),
        );

        assert_eq!(
            Value::Object(out),
            json!({
                "email": "a@b.com",
                "email_verified": true,
                "user_metadata": { "favoriteColor": "red" }
            })
        );
    }

    #[test]
    fn test_enforced_attribute_wins_over_caller() {
        let mut fixture = Fixture::new();
        fixture.connector.attributes = AttributeSource::from_record(record(json!({ "demoUser": true })));

        let out = fixture.serializer().serialize(
            &record(json!({ "demoUser": false, "email": "a@b.com" })),
            &SerializeOptions::default(),
        );

        assert_eq!(out["app_metadata"]["demoUser"], json!(true));
    }

    #[test]
    fn test_model_attributes_win_over_connector_attributes() {
        let mut fixture = Fixture::new();
        fixture.connector.attributes = AttributeSource::from_record(record(json!({ "demoUser": true })));
        fixture.model = Some(AttributeSources {
            attributes: AttributeSource::from_record(record(json!({ "demoUser": false }))),
            ..Default::default()
        });

        let out = fixture
            .serializer()
            .serialize(&Record::new(), &SerializeOptions::default());
        assert_eq!(out["app_metadata"]["demoUser"], json!(false));
    }

    #[test]
    fn test_defaults_fill_only_unset_fields() {
        let mut fixture = Fixture::new();
        fixture.connector.defaults = AttributeSource::from_record(record(json!({
            "favoriteColor": "green",
            "emailVerified": false
        })));
        fixture.model = Some(AttributeSources {
            defaults: AttributeSource::from_record(record(json!({ "favoriteColor": "blue" }))),
            ..Default::default()
        });

        let out = fixture.serializer().serialize(
            &record(json!({ "emailVerified": true })),
            &SerializeOptions::default(),
        );
        assert_eq!(out["email_verified"], json!(true));
        assert_eq!(out["user_metadata"]["favoriteColor"], json!("blue"));

        let no_defaults = SerializeOptions {
            serialize_defaults: false,
            ..Default::default()
        };
        let out = fixture
            .serializer()
            .serialize(&record(json!({ "emailVerified": true })), &no_defaults);
        assert!(!out.contains_key("user_metadata"));
    }

    #[test]
    fn test_computed_source_sees_model_and_data() {
        let mut fixture = Fixture::new();
        fixture.connector.attributes = Some(AttributeSource::computed(|model, data, _| {
            let mut out = Record::new();
            let tag = format!("{model}:{}", data.get("email").and_then(Value::as_str).unwrap_or("-"));
            out.insert("favoriteColor".into(), json!(tag));
            out
        }));

        let out = fixture
            .serializer()
            .serialize(&record(json!({ "email": "a@b.com" })), &SerializeOptions::default());
        assert_eq!(out["user_metadata"]["favoriteColor"], json!("User:a@b.com"));
    }

    #[test]
    fn test_bucket_precedence() {
        let mut fixture = Fixture::new();
        fixture.model = Some(AttributeSources {
            user_metadata: record(json!({ "theme": "model", "lang": "model" })),
            ..Default::default()
        });
        let options = SerializeOptions {
            user_metadata: Some(record(json!({ "lang": "options" }))),
            instance_data: Some(record(json!({
                "favoriteColor": "stored",
                "user_metadata": { "shoe": 42, "theme": "stored" }
            }))),
            ..Default::default()
        };

        let out = fixture.serializer().serialize(
            &record(json!({ "favoriteColor": "caller", "user_metadata": { "theme": "caller" } })),
            &options,
        );

        assert_eq!(
            out["user_metadata"],
            json!({ "shoe": 42, "favoriteColor": "caller", "theme": "model", "lang": "options" })
        );
    }

    #[test]
    fn test_whitelist_then_omit_and_pick() {
        let fixture = Fixture::new();
        let data = record(json!({
            "email": "a@b.com",
            "name": "Jo",
            "blocked": false,
            "favoriteColor": "red"
        }));

        let out = fixture.serializer().serialize(&data, &SerializeOptions::default());
        assert!(!out.contains_key("name"), "name is not whitelisted");

        let omit = SerializeOptions {
            omit: Some(vec!["blocked".into()]),
            ..Default::default()
        };
        let out = fixture.serializer().serialize(&data, &omit);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["email", "user_metadata"]);

        let pick = SerializeOptions {
            pick: Some(vec!["email".into(), "name".into()]),
            ..Default::default()
        };
        let out = fixture.serializer().serialize(&data, &pick);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["email"]);
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: SerializeOptions = serde_json::from_value(json!({
            "serializeDefaults": false,
            "omit": ["password"],
            "app_metadata": { "plan": "pro" },
            "instanceData": { "id": "auth0|1" }
        }))
        .unwrap();
        assert!(!options.serialize_defaults);
        assert_eq!(options.app_metadata.unwrap()["plan"], json!("pro"));
        assert!(options.instance_data.is_some());
        assert!(SerializeOptions::default().serialize_defaults);
    }

    #[test]
    fn test_normalize_maps_and_coerces() {
        let inverse = table().invert().unwrap();
        let dates = default_date_fields();
        let normalizer = Normalizer {
            mapping: &inverse,
            date_fields: &dates,
        };

        let out = normalizer.normalize(&record(json!({
            "user_id": "auth0|1",
            "email": "a@b.com",
            "created_at": "2024-03-01T10:00:00.000+02:00",
            "last_login": "garbage",
            "user_metadata": { "favoriteColor": "red", "shoe": 42 },
            "app_metadata": { "demoUser": true },
            "unmapped_remote": 1
        })));

        assert_eq!(
            Value::Object(out),
            json!({
                "id": "auth0|1",
                "email": "a@b.com",
                "createdAt": "2024-03-01T08:00:00.000Z",
                "lastLogin": null,
                "favoriteColor": "red",
                "demoUser": true
            })
        );
    }

    #[test]
    fn test_round_trip_for_mapped_fields() {
        let mapping = table();
        let inverse = mapping.invert().unwrap();
        let whitelist: Vec<String> = mapping.iter().map(|(_, to)| to.split('.').next().unwrap_or(to).to_string()).collect();
        let connector = AttributeSources::default();
        let serializer = Serializer {
            model: "User",
            connector: &connector,
            overrides: None,
            mapping: &mapping,
            whitelist: &whitelist,
        };
        let normalizer = Normalizer {
            mapping: &inverse,
            date_fields: &[],
        };

        let original = record(json!({
            "id": "auth0|1",
            "email": "a@b.com",
            "favoriteColor": "red",
            "demoUser": true,
            "givenName": "Jo"
        }));
        let round_tripped = normalizer.normalize(&serializer.serialize(&original, &SerializeOptions::default()));
        assert_eq!(round_tripped, original);
    }
}
