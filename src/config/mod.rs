//! Connector configuration.
//!
//! Loaded from TOML. `${VAR}` placeholders are expanded from the environment
//! before parsing (placeholders inside `#` comments are left alone).
//!
//! ```toml
//! domain = "tenant.auth0.com"
//! client_id = "${AUTH0_CLIENT_ID}"
//! client_secret = "${AUTH0_CLIENT_SECRET}"
//! connection = "Username-Password-Authentication"
//!
//! [mapping]
//! favoriteColor = "user_metadata.favoriteColor"
//! demoUser = "app_metadata.demoUser"
//!
//! [models.Partner]
//! connection = "partners"
//! attributes = { demoUser = false }
//! ```

mod model;
mod observability;

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

pub use model::ModelConfig;
pub use observability::{LogFormat, LogLevel, LoggingConfig};

use crate::{
    client::TokenScopes,
    filter::{Filter, QueryFilter, SearchEngine},
    mapping::{FieldMapper, FieldMapping, MappingError, MappingScope},
    object::Record,
};

/// Tokens are refreshed this long before they expire.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 5;

/// Connector-wide settings plus per-model overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Directory tenant domain (e.g. `tenant.auth0.com`).
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Default directory connection for created users and scoped queries.
    #[serde(default)]
    pub connection: String,

    #[serde(default)]
    pub search_engine: SearchEngine,

    /// Restrict every query to the model's connection.
    #[serde(default = "default_true")]
    pub connection_query_scope: bool,

    /// Lifetime of signed API tokens, in seconds.
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,

    /// Caller → remote entries layered over the built-in table.
    #[serde(default)]
    pub mapping: FieldMapping,

    /// Explicit remote → caller table. Defaults to the inverse of the serialize table.
    #[serde(default)]
    pub normalize_mapping: Option<FieldMapping>,

    /// Explicit caller → remote table, replacing the built-in table and `mapping`.
    #[serde(default)]
    pub serialize_mapping: Option<FieldMapping>,

    #[serde(default)]
    pub defaults: Record,

    #[serde(default)]
    pub attributes: Record,

    #[serde(default)]
    pub query_scope: QueryFilter,

    #[serde(default)]
    pub scopes: TokenScopes,

    #[serde(default)]
    pub app_metadata: Record,

    #[serde(default)]
    pub user_metadata: Record,

    /// Remote fields allowed in outbound records.
    #[serde(default = "default_outbound_attributes")]
    pub outbound_attributes: Vec<String>,

    /// Caller fields coerced to timestamps on the way in.
    #[serde(default = "default_date_fields")]
    pub date_fields: Vec<String>,

    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            connection: String::new(),
            search_engine: SearchEngine::default(),
            connection_query_scope: true,
            token_lifetime_secs: default_token_lifetime_secs(),
            mapping: FieldMapping::default(),
            normalize_mapping: None,
            serialize_mapping: None,
            defaults: Record::new(),
            attributes: Record::new(),
            query_scope: QueryFilter::default(),
            scopes: TokenScopes::default(),
            app_metadata: Record::new(),
            user_metadata: Record::new(),
            outbound_attributes: default_outbound_attributes(),
            date_fields: default_date_fields(),
            models: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_token_lifetime_secs() -> u64 {
    3600
}

pub fn default_outbound_attributes() -> Vec<String> {
    [
        "connection",
        "client_id",
        "username",
        "password",
        "blocked",
        "email",
        "email_verified",
        "phone_number",
        "phone_verified",
        "verify_email",
        "verify_phone_number",
        "verify_password",
        "user_metadata",
        "app_metadata",
    ]
    .map(String::from)
    .to_vec()
}

pub fn default_date_fields() -> Vec<String> {
    ["createdAt", "updatedAt", "lastLogin"]
        .map(String::from)
        .to_vec()
}

impl ConnectorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ConnectorConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required settings, mapping injectivity and scope filters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("domain", &self.domain),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("connection", &self.connection),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "`{name}` is required to initialize the connector"
                )));
            }
        }

        if self.token_lifetime_secs <= TOKEN_REFRESH_MARGIN_SECS {
            return Err(ConfigError::Validation(format!(
                "`token_lifetime_secs` must be greater than {TOKEN_REFRESH_MARGIN_SECS}"
            )));
        }

        self.field_mapper()?;

        let scopes = std::iter::once(("connector", &self.query_scope)).chain(
            self.models
                .iter()
                .map(|(name, model)| (name.as_str(), &model.query_scope)),
        );
        for (owner, scope) in scopes {
            if let Some(where_clause) = &scope.where_clause {
                Filter::from_value(where_clause).map_err(|e| {
                    ConfigError::Validation(format!("invalid query_scope for {owner}: {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Connector-wide mapping tables before model overrides.
    pub fn mapping_scope(&self) -> MappingScope {
        MappingScope {
            serialize: Some(
                self.serialize_mapping
                    .clone()
                    .unwrap_or_else(|| FieldMapping::builtin().extended(&self.mapping)),
            ),
            normalize: self.normalize_mapping.clone(),
        }
    }

    /// Resolve every model's mapping tables.
    pub fn field_mapper(&self) -> Result<FieldMapper, ConfigError> {
        let models = self
            .models
            .iter()
            .map(|(name, model)| (name.clone(), model.mapping_scope()));
        Ok(FieldMapper::new(&self.mapping_scope(), models)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Invalid field mapping: {0}")]
    Mapping(#[from] MappingError),
}

/// Expand `${VAR}` placeholders, skipping any that appear after a `#`.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    const MINIMAL: &str = r#"
        domain = "tenant.auth0.com"
        client_id = "abc"
        client_secret = "secret"
        connection = "Username-Password-Authentication"
    "#;

    #[test]
    fn test_minimal_config() {
        let config = ConnectorConfig::from_str(MINIMAL).unwrap();

        assert_eq!(config.domain, "tenant.auth0.com");
        assert!(config.connection_query_scope);
        assert_eq!(config.search_engine, SearchEngine::V2);
        assert_eq!(config.token_lifetime_secs, 3600);
        assert_eq!(config.outbound_attributes, default_outbound_attributes());
        assert_eq!(config.date_fields, vec!["createdAt", "updatedAt", "lastLogin"]);
    }

    #[test]
    fn test_full_config() {
        let config = ConnectorConfig::from_str(&format!(
            r#"{MINIMAL}
            search_engine = "v3"
            token_lifetime_secs = 600

            [mapping]
            favoriteColor = "user_metadata.favoriteColor"

            [attributes]
            demoUser = true

            [scopes]
            users = ["read"]

            [models.Partner]
            connection = "partners"

            [models.Partner.mapping]
            tier = "app_metadata.tier"
            "#
        ))
        .unwrap();

        assert_eq!(config.search_engine, SearchEngine::V3);
        assert_eq!(config.attributes["demoUser"], json!(true));
        assert_eq!(config.scopes.actions("users"), Some(&["read".to_string()][..]));
        assert_eq!(config.models["Partner"].connection.as_deref(), Some("partners"));

        let mapper = config.field_mapper().unwrap();
        assert_eq!(
            mapper.serialize_field("Partner", "favoriteColor"),
            "user_metadata.favoriteColor"
        );
        assert_eq!(mapper.serialize_field("Partner", "tier"), "app_metadata.tier");
        assert_eq!(mapper.serialize_field("User", "tier"), "tier");
    }

    #[test]
    fn test_missing_required_setting() {
        let err = ConnectorConfig::from_str(r#"domain = "tenant.auth0.com""#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("client_id")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ConnectorConfig::from_str(&format!("{MINIMAL}\nbogus = 1")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_short_token_lifetime_rejected() {
        let err =
            ConnectorConfig::from_str(&format!("{MINIMAL}\ntoken_lifetime_secs = 5")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("token_lifetime_secs")));
    }

    #[test]
    fn test_non_injective_mapping_rejected() {
        let err = ConnectorConfig::from_str(&format!(
            "{MINIMAL}\n[mapping]\nfullName = \"name\""
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Mapping(MappingError::DuplicateTarget { .. })));
    }

    #[test]
    fn test_model_mapping_reusing_connector_target_rejected() {
        let err = ConnectorConfig::from_str(&format!(
            "{MINIMAL}\n[mapping]\nfavoriteColor = \"user_metadata.favoriteColor\"\n\
             [models.Account.mapping]\ncolor = \"user_metadata.favoriteColor\""
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Mapping(MappingError::DuplicateTarget { .. })));
    }

    #[test]
    fn test_dropping_builtin_entry_resolves_collision() {
        let config = ConnectorConfig::from_str(&format!(
            "{MINIMAL}\n[mapping]\nfullName = \"name\"\nname = \"\""
        ))
        .unwrap();
        let mapper = config.field_mapper().unwrap();
        assert_eq!(mapper.normalize_field("User", "name"), "fullName");
    }

    #[test]
    fn test_malformed_query_scope_rejected() {
        let err = ConnectorConfig::from_str(&format!(
            "{MINIMAL}\n[query_scope]\nwhere = {{ and = [1, 2] }}"
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("query_scope")));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("AUTH0_TEST_CLIENT_SECRET", Some("from-env"), || {
            let config = ConnectorConfig::from_str(
                &MINIMAL.replace("\"secret\"", "\"${AUTH0_TEST_CLIENT_SECRET}\""),
            )
            .unwrap();
            assert_eq!(config.client_secret, "from-env");
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("AUTH0_TEST_MISSING_VAR", || {
            let err = expand_env_vars("client_id = \"${AUTH0_TEST_MISSING_VAR}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "AUTH0_TEST_MISSING_VAR"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let input = "# client_secret = \"${AUTH0_TEST_NEVER_SET}\"";
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_env_var_before_comment_expanded() {
        temp_env::with_var("AUTH0_TEST_DOMAIN", Some("t.auth0.com"), || {
            let result =
                expand_env_vars("domain = \"${AUTH0_TEST_DOMAIN}\" # ${AUTH0_TEST_NEVER_SET}")
                    .unwrap();
            assert_eq!(result, "domain = \"t.auth0.com\" # ${AUTH0_TEST_NEVER_SET}");
        });
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = ConnectorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.client_id, "abc");
    }

    #[test]
    fn test_from_file_missing() {
        let err = ConnectorConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, path) if path.ends_with("here.toml")));
    }
}
