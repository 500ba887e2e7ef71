//! Persistence operations against the remote directory.
//!
//! Every operation resolves the model's settings, obtains a cached client
//! handle for the requested scopes, translates caller records and filters to
//! the directory's shape, and normalizes what comes back.

mod error;
mod query;
mod settings;

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

pub use error::{ConnectorError, ConnectorResult};
pub use settings::ConnectorSettings;

#[cfg(feature = "jwt")]
use crate::{client::ManagementClientFactory, config::ConnectorConfig};
use crate::{
    attributes::SerializeOptions,
    cache::{TtlCache, hash_args},
    client::{ClientError, ClientFactory, DirectoryClient, TokenScopes},
    config::TOKEN_REFRESH_MARGIN_SECS,
    filter::QueryFilter,
    object::Record,
};

/// Remote field holding the user id.
const REMOTE_ID: &str = "user_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    pub id: String,
    pub is_new_instance: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountResult {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Created(CreateResult),
    Updated(Record),
}

pub struct Connector {
    settings: Arc<ConnectorSettings>,
    factory: Arc<dyn ClientFactory>,
    clients: TtlCache<Arc<dyn DirectoryClient>>,
}

impl Connector {
    /// Client handles are reused until shortly before their token expires.
    pub fn new(settings: impl Into<Arc<ConnectorSettings>>, factory: Arc<dyn ClientFactory>) -> Self {
        let settings = settings.into();
        let ttl = settings
            .token_lifetime()
            .saturating_sub(Duration::from_secs(TOKEN_REFRESH_MARGIN_SECS));
        Self {
            settings,
            factory,
            clients: TtlCache::new(ttl),
        }
    }

    /// Connector signing its own management API tokens.
    #[cfg(feature = "jwt")]
    pub fn from_config(config: &ConnectorConfig) -> ConnectorResult<Self> {
        let settings = ConnectorSettings::from_config(config)?;
        let factory = ManagementClientFactory::new(
            settings.domain(),
            settings.client_id(),
            settings.client_secret(),
            settings.token_lifetime(),
        )?;
        Ok(Self::new(settings, Arc::new(factory)))
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    /// The model's connection, else the connector's.
    pub fn connection(&self, model: &str) -> &str {
        self.settings.connection(model)
    }

    /// Authenticated handle for `model`, shared per `(model, scopes)`.
    pub fn client(
        &self,
        model: &str,
        scopes: Option<&TokenScopes>,
    ) -> ConnectorResult<Arc<dyn DirectoryClient>> {
        let scopes = self.settings.token_scopes(model, scopes);
        let key = hash_args(&(model, &scopes));
        let client = self
            .clients
            .get_or_try_insert_with(&key, || self.factory.create_client(model, &scopes))?;
        Ok(client)
    }

    /// Caller-side name of the id field.
    fn id_field(&self, model: &str) -> String {
        self.settings.mapper().normalize_field(model, REMOTE_ID)
    }

    fn normalize_response(&self, model: &str, response: Value) -> ConnectorResult<Record> {
        match response {
            Value::Object(external) => Ok(self.settings.normalize(model, &external)),
            other => Err(ClientError::InvalidResponse(format!("expected a user object, got {other}")).into()),
        }
    }

    pub async fn create(
        &self,
        model: &str,
        data: &Record,
        options: &SerializeOptions,
    ) -> ConnectorResult<CreateResult> {
        let mut body = self.settings.serialize(model, data, options);
        body.insert("connection".into(), json!(self.connection(model)));

        let client = self.client(model, options.scopes.as_ref())?;
        let created = client.create_user(&body).await?;
        let id = created
            .get(REMOTE_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::InvalidResponse(format!("created user has no {REMOTE_ID}")))?
            .to_string();

        info!(model, id = %id, "Created user");
        Ok(CreateResult {
            id,
            is_new_instance: true,
        })
    }

    pub async fn find(&self, model: &str, id: &str) -> ConnectorResult<Option<Record>> {
        let filter = QueryFilter::with_where(json!({ "id": id }));
        Ok(self.all(model, &filter).await?.into_iter().next())
    }

    pub async fn all(&self, model: &str, filter: &QueryFilter) -> ConnectorResult<Vec<Record>> {
        let query = self.settings.build_query(model, filter)?;
        let page = self.client(model, None)?.get_users(&query).await?;
        debug!(model, found = page.users.len(), "Fetched users");

        Ok(page
            .users
            .iter()
            .filter_map(Value::as_object)
            .map(|external| self.settings.normalize(model, external))
            .collect())
    }

    pub async fn count(&self, model: &str, where_clause: Option<&Value>) -> ConnectorResult<u64> {
        let mut query = self.settings.build_query(
            model,
            &QueryFilter {
                where_clause: where_clause.cloned(),
                ..Default::default()
            },
        )?;
        query.fields = Some(REMOTE_ID.to_string());
        query.per_page = Some(1);
        query.include_totals = Some(true);

        let page = self.client(model, None)?.get_users(&query).await?;
        Ok(page.total.unwrap_or(0))
    }

    pub async fn exists(&self, model: &str, id: &str) -> ConnectorResult<bool> {
        Ok(self.count(model, Some(&json!({ "id": id }))).await? > 0)
    }

    pub async fn update(
        &self,
        model: &str,
        id: &str,
        data: &Record,
        options: &SerializeOptions,
    ) -> ConnectorResult<Record> {
        if id.is_empty() {
            return Err(ConnectorError::MissingId);
        }

        let mut body = self.settings.serialize(model, data, options);
        body.insert("client_id".into(), json!(self.settings.client_id()));
        body.insert("connection".into(), json!(self.connection(model)));

        let client = self.client(model, options.scopes.as_ref())?;
        let updated = client.update_user(id, &body).await?;
        debug!(model, id, "Updated user");
        self.normalize_response(model, updated)
    }

    /// Update every match of `where_clause`, one at a time. The first failure
    /// aborts the remaining updates.
    pub async fn update_all(
        &self,
        model: &str,
        where_clause: Option<&Value>,
        data: &Record,
        options: &SerializeOptions,
    ) -> ConnectorResult<CountResult> {
        let filter = QueryFilter {
            where_clause: where_clause.cloned(),
            ..Default::default()
        };
        let id_field = self.id_field(model);
        let mut result = CountResult::default();

        for instance in self.all(model, &filter).await? {
            let id = instance
                .get(&id_field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ConnectorError::MissingId)?;
            let mut merged = instance.clone();
            merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
            let options = SerializeOptions {
                instance_data: Some(instance),
                ..options.clone()
            };
            self.update(model, &id, &merged, &options).await?;
            result.count += 1;
        }

        Ok(result)
    }

    /// Create when `data` carries no id, update otherwise.
    pub async fn save(
        &self,
        model: &str,
        data: &Record,
        options: &SerializeOptions,
    ) -> ConnectorResult<SaveOutcome> {
        let id = data
            .get(&self.id_field(model))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());

        match id {
            Some(id) => Ok(SaveOutcome::Updated(self.update(model, id, data, options).await?)),
            None => Ok(SaveOutcome::Created(self.create(model, data, options).await?)),
        }
    }

    /// Partial update: the stored record is loaded first and defaults are not
    /// reapplied.
    pub async fn update_attributes(
        &self,
        model: &str,
        id: &str,
        data: &Record,
        options: &SerializeOptions,
    ) -> ConnectorResult<Record> {
        let instance = self
            .find(model, id)
            .await?
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;

        let mut merged = instance.clone();
        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        let options = SerializeOptions {
            serialize_defaults: false,
            instance_data: Some(instance),
            ..options.clone()
        };
        self.update(model, id, &merged, &options).await
    }

    pub async fn destroy(&self, model: &str, id: &str) -> ConnectorResult<CountResult> {
        self.client(model, None)?.delete_user(id).await?;
        info!(model, id, "Deleted user");
        Ok(CountResult { count: 1 })
    }

    /// Delete by id when `where_clause` names one, else every match.
    pub async fn destroy_all(
        &self,
        model: &str,
        where_clause: Option<&Value>,
    ) -> ConnectorResult<CountResult> {
        if let Some(id) = where_clause
            .and_then(|w| w.get("id"))
            .and_then(Value::as_str)
        {
            return self.destroy(model, id).await;
        }

        let filter = QueryFilter {
            where_clause: where_clause.cloned(),
            fields: Some(vec![self.id_field(model)]),
            ..Default::default()
        };
        let id_field = self.id_field(model);
        let client = self.client(model, None)?;
        let mut result = CountResult::default();

        for instance in self.all(model, &filter).await? {
            let id = instance
                .get(&id_field)
                .and_then(Value::as_str)
                .ok_or(ConnectorError::MissingId)?;
            client.delete_user(id).await?;
            result.count += 1;
        }

        info!(model, count = result.count, "Deleted users");
        Ok(result)
    }

    /// Link the identity described by `data` into user `id`.
    pub async fn link(&self, model: &str, id: &str, data: &Value) -> ConnectorResult<Value> {
        Ok(self.client(model, None)?.link_user(id, data).await?)
    }

    pub async fn unlink(
        &self,
        model: &str,
        id: &str,
        provider: &str,
        user_id: &str,
    ) -> ConnectorResult<Value> {
        Ok(self
            .client(model, None)?
            .unlink_user(id, provider, user_id)
            .await?)
    }
}
