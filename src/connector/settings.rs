use std::{collections::HashMap, time::Duration};

use serde_json::Value;

use crate::{
    attributes::{AttributeSource, AttributeSources, Normalizer, SerializeOptions, Serializer},
    client::TokenScopes,
    config::{ConfigError, ConnectorConfig, ModelConfig},
    filter::SearchEngine,
    mapping::{FieldMapper, MappingDirection},
    object::Record,
};

/// Per-model settings after resolution.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModelSettings {
    pub(crate) connection: Option<String>,
    pub(crate) connection_query_scope: Option<bool>,
    pub(crate) query_scope: Option<Value>,
    pub(crate) scopes: Option<TokenScopes>,
    pub(crate) sources: AttributeSources,
}

impl ModelSettings {
    fn from_config(config: &ModelConfig) -> Self {
        Self {
            connection: config.connection.clone().filter(|c| !c.is_empty()),
            connection_query_scope: config.connection_query_scope,
            query_scope: config.query_scope.where_clause.clone(),
            scopes: config.scopes.clone(),
            sources: AttributeSources {
                defaults: AttributeSource::from_record(config.defaults.clone()),
                attributes: AttributeSource::from_record(config.attributes.clone()),
                app_metadata: config.app_metadata.clone(),
                user_metadata: config.user_metadata.clone(),
            },
        }
    }
}

/// Connector configuration resolved once at startup.
///
/// Mapping tables are computed for every configured model up front, so a
/// collision in any of them fails here rather than on first use.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    domain: String,
    client_id: String,
    client_secret: String,
    connection: String,
    pub(crate) search_engine: SearchEngine,
    pub(crate) connection_query_scope: bool,
    token_lifetime: Duration,
    scopes: TokenScopes,
    pub(crate) query_scope: Option<Value>,
    sources: AttributeSources,
    outbound_attributes: Vec<String>,
    date_fields: Vec<String>,
    mapper: FieldMapper,
    pub(crate) models: HashMap<String, ModelSettings>,
}

impl ConnectorSettings {
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            domain: config.domain.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            connection: config.connection.clone(),
            search_engine: config.search_engine,
            connection_query_scope: config.connection_query_scope,
            token_lifetime: Duration::from_secs(config.token_lifetime_secs),
            scopes: TokenScopes::defaults().merged(&config.scopes),
            query_scope: config.query_scope.where_clause.clone(),
            sources: AttributeSources {
                defaults: AttributeSource::from_record(config.defaults.clone()),
                attributes: AttributeSource::from_record(config.attributes.clone()),
                app_metadata: config.app_metadata.clone(),
                user_metadata: config.user_metadata.clone(),
            },
            outbound_attributes: config.outbound_attributes.clone(),
            date_fields: config.date_fields.clone(),
            mapper: config.field_mapper()?,
            models: config
                .models
                .iter()
                .map(|(name, model)| (name.clone(), ModelSettings::from_config(model)))
                .collect(),
        })
    }

    /// Replace the defaults source, connector-wide (`None`) or for one model.
    pub fn with_defaults(mut self, model: Option<&str>, source: AttributeSource) -> Self {
        self.sources_mut(model).defaults = Some(source);
        self
    }

    /// Replace the enforced-attributes source, connector-wide (`None`) or for one model.
    pub fn with_attributes(mut self, model: Option<&str>, source: AttributeSource) -> Self {
        self.sources_mut(model).attributes = Some(source);
        self
    }

    fn sources_mut(&mut self, model: Option<&str>) -> &mut AttributeSources {
        match model {
            Some(name) => &mut self.models.entry(name.to_string()).or_default().sources,
            None => &mut self.sources,
        }
    }

    pub(crate) fn model(&self, model: &str) -> Option<&ModelSettings> {
        self.models.get(model)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn search_engine(&self) -> SearchEngine {
        self.search_engine
    }

    /// The model's connection, else the connector's.
    pub fn connection(&self, model: &str) -> &str {
        self.model(model)
            .and_then(|m| m.connection.as_deref())
            .unwrap_or(&self.connection)
    }

    /// Defaults, then connector scopes, then model scopes, then `call`.
    pub fn token_scopes(&self, model: &str, call: Option<&TokenScopes>) -> TokenScopes {
        let mut scopes = self.scopes.clone();
        if let Some(model_scopes) = self.model(model).and_then(|m| m.scopes.as_ref()) {
            scopes = scopes.merged(model_scopes);
        }
        if let Some(call) = call {
            scopes = scopes.merged(call);
        }
        scopes
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }

    pub fn serializer<'a>(&'a self, model: &'a str) -> Serializer<'a> {
        Serializer {
            model,
            connector: &self.sources,
            overrides: self.model(model).map(|m| &m.sources),
            mapping: self.mapper.resolve(model, MappingDirection::Serialize),
            whitelist: &self.outbound_attributes,
        }
    }

    pub fn normalizer(&self, model: &str) -> Normalizer<'_> {
        Normalizer {
            mapping: self.mapper.resolve(model, MappingDirection::Normalize),
            date_fields: &self.date_fields,
        }
    }

    /// Caller record → outbound remote record.
    pub fn serialize(&self, model: &str, data: &Record, options: &SerializeOptions) -> Record {
        self.serializer(model).serialize(data, options)
    }

    /// Remote record → caller record.
    pub fn normalize(&self, model: &str, external: &Record) -> Record {
        self.normalizer(model).normalize(external)
    }
}
