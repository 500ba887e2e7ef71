//! Remote directory access.
//!
//! [`DirectoryClient`] is the seam between the connector and the remote user
//! directory. The connector never builds clients itself; it asks a
//! [`ClientFactory`] for an authenticated handle and caches the handle for the
//! token lifetime.

mod http;
mod token;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[cfg(feature = "jwt")]
pub use http::ManagementClientFactory;
pub use http::{ManagementClient, management_base_url};
#[cfg(feature = "jwt")]
pub use token::sign_api_token;
pub use token::{ApiTokenClaims, ScopeActions, TokenScopes};

use crate::{filter::UserQuery, object::Record};

/// Error type for directory client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Directory API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Invalid directory URL: {0}")]
    Url(String),

    #[cfg(feature = "jwt")]
    #[error("Failed to sign API token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One page of a user search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPage {
    pub users: Vec<Value>,
    /// Present when totals were requested.
    pub total: Option<u64>,
}

/// The search endpoint answers with a bare array, or with an envelope when
/// `include_totals` is set.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserPageBody {
    List(Vec<Value>),
    Paged {
        users: Vec<Value>,
        #[serde(default)]
        total: Option<u64>,
    },
}

impl From<UserPageBody> for UserPage {
    fn from(body: UserPageBody) -> Self {
        match body {
            UserPageBody::List(users) => Self { users, total: None },
            UserPageBody::Paged { users, total } => Self { users, total },
        }
    }
}

impl UserPage {
    pub fn from_value(value: Value) -> ClientResult<Self> {
        serde_json::from_value::<UserPageBody>(value)
            .map(Into::into)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Authenticated handle to the remote user directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn create_user(&self, data: &Record) -> ClientResult<Value>;

    async fn get_users(&self, query: &UserQuery) -> ClientResult<UserPage>;

    async fn update_user(&self, id: &str, data: &Record) -> ClientResult<Value>;

    async fn delete_user(&self, id: &str) -> ClientResult<()>;

    /// Link a secondary identity into the user `id`.
    async fn link_user(&self, id: &str, data: &Value) -> ClientResult<Value>;

    async fn unlink_user(&self, id: &str, provider: &str, user_id: &str) -> ClientResult<Value>;
}

/// Produces authenticated directory handles.
pub trait ClientFactory: Send + Sync {
    fn create_client(
        &self,
        model: &str,
        scopes: &TokenScopes,
    ) -> ClientResult<Arc<dyn DirectoryClient>>;
}
