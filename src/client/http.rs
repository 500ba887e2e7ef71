//! HTTP client for the directory management API (`/api/v2`).

#[cfg(feature = "jwt")]
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
#[cfg(feature = "jwt")]
use tracing::debug;
use url::Url;

#[cfg(feature = "jwt")]
use super::{ApiTokenClaims, ClientFactory, TokenScopes, sign_api_token};
use super::{ClientError, ClientResult, DirectoryClient, UserPage};
use crate::{filter::UserQuery, object::Record};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `https://<domain>/api/v2`, keeping an explicit scheme if one is given.
pub fn management_base_url(domain: &str) -> String {
    let domain = domain.trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        format!("{domain}/api/v2")
    } else {
        format!("https://{domain}/api/v2")
    }
}

fn http_client() -> ClientResult<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Bearer-authenticated management API client.
#[derive(Clone)]
pub struct ManagementClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ManagementClient {
    /// Client for the tenant at `domain` (e.g. `"tenant.auth0.com"`).
    pub fn new(domain: &str, token: impl Into<String>) -> ClientResult<Self> {
        Self::with_http_client(http_client()?, &management_base_url(domain), token)
    }

    /// Client against an explicit API base URL, sharing an existing connection pool.
    pub fn with_http_client(
        http: Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Url(format!("{base_url} cannot be a base URL")));
        }
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send `request` and decode the JSON body. Empty bodies decode to `None`.
    async fn send(&self, request: RequestBuilder) -> ClientResult<Option<Value>> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Prefer the API's `message`, then `error`, then the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = map.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

#[async_trait]
impl DirectoryClient for ManagementClient {
    async fn create_user(&self, data: &Record) -> ClientResult<Value> {
        let url = self.endpoint(&["users"])?;
        Ok(self
            .send(self.http.post(url).json(data))
            .await?
            .unwrap_or(Value::Null))
    }

    async fn get_users(&self, query: &UserQuery) -> ClientResult<UserPage> {
        let url = self.endpoint(&["users"])?;
        match self.send(self.http.get(url).query(query)).await? {
            Some(body) => UserPage::from_value(body),
            None => Ok(UserPage::default()),
        }
    }

    async fn update_user(&self, id: &str, data: &Record) -> ClientResult<Value> {
        let url = self.endpoint(&["users", id])?;
        Ok(self
            .send(self.http.patch(url).json(data))
            .await?
            .unwrap_or(Value::Null))
    }

    async fn delete_user(&self, id: &str) -> ClientResult<()> {
        let url = self.endpoint(&["users", id])?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn link_user(&self, id: &str, data: &Value) -> ClientResult<Value> {
        let url = self.endpoint(&["users", id, "identities"])?;
        Ok(self
            .send(self.http.post(url).json(data))
            .await?
            .unwrap_or(Value::Null))
    }

    async fn unlink_user(&self, id: &str, provider: &str, user_id: &str) -> ClientResult<Value> {
        let url = self.endpoint(&["users", id, "identities", provider, user_id])?;
        Ok(self
            .send(self.http.delete(url))
            .await?
            .unwrap_or(Value::Null))
    }
}

/// Signs a fresh API token per handle and wraps it in a [`ManagementClient`].
#[cfg(feature = "jwt")]
pub struct ManagementClientFactory {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token_lifetime: Duration,
}

#[cfg(feature = "jwt")]
impl ManagementClientFactory {
    pub fn new(
        domain: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_lifetime: Duration,
    ) -> ClientResult<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: management_base_url(domain),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_lifetime,
        })
    }
}

#[cfg(feature = "jwt")]
impl ClientFactory for ManagementClientFactory {
    fn create_client(
        &self,
        model: &str,
        scopes: &TokenScopes,
    ) -> ClientResult<Arc<dyn DirectoryClient>> {
        let claims = ApiTokenClaims::new(&self.client_id, scopes, self.token_lifetime);
        let token = sign_api_token(&claims, &self.client_secret)?;
        debug!(model, jti = %claims.jti, exp = claims.exp, "Signed management API token");

        let client = ManagementClient::with_http_client(self.http.clone(), &self.base_url, token)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    use super::*;
    use crate::filter::SearchEngine;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_management_base_url() {
        assert_eq!(
            management_base_url("tenant.auth0.com"),
            "https://tenant.auth0.com/api/v2"
        );
        assert_eq!(
            management_base_url("http://localhost:8080/"),
            "http://localhost:8080/api/v2"
        );
    }

    #[tokio::test]
    async fn test_get_users_sends_query_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users"))
            .and(query_param("q", "email:\"a@b.com\""))
            .and(query_param("search_engine", "v2"))
            .and(query_param("per_page", "5"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "user_id": "auth0-1", "email": "a@b.com" }],
                "total": 1
            })))
            .mount(&server)
            .await;

        let client = ManagementClient::new(&server.uri(), "tok").unwrap();
        let query = UserQuery {
            q: Some("email:\"a@b.com\"".into()),
            search_engine: Some(SearchEngine::V2),
            per_page: Some(5),
            ..Default::default()
        };
        let page = client.get_users(&query).await.unwrap();

        assert_eq!(page.total, Some(1));
        assert_eq!(page.users[0]["user_id"], "auth0-1");
    }

    #[tokio::test]
    async fn test_create_user_posts_body() {
        let server = MockServer::start().await;
        let data = json!({ "email": "a@b.com", "connection": "db" });
        Mock::given(method("POST"))
            .and(path("/api/v2/users"))
            .and(body_json(&data))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "user_id": "auth0-9" })))
            .mount(&server)
            .await;

        let client = ManagementClient::new(&server.uri(), "tok").unwrap();
        let created = client.create_user(&record(data)).await.unwrap();

        assert_eq!(created["user_id"], "auth0-9");
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v2/users/abc"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": 400,
                "error": "Bad Request",
                "message": "Payload validation error"
            })))
            .mount(&server)
            .await;

        let client = ManagementClient::new(&server.uri(), "tok").unwrap();
        let err = client
            .update_user("abc", &record(json!({ "blocked": true })))
            .await
            .unwrap_err();

        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Payload validation error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_user_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v2/users/abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = ManagementClient::new(&server.uri(), "tok").unwrap();
        client.delete_user("abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_unlink_user_path() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v2/users/abc/identities/google-oauth2/xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ManagementClient::new(&server.uri(), "tok").unwrap();
        let remaining = client.unlink_user("abc", "google-oauth2", "xyz").await.unwrap();
        assert_eq!(remaining, json!([]));
    }

    #[cfg(feature = "jwt")]
    #[tokio::test]
    async fn test_factory_signs_bearer_token() {
        use wiremock::matchers::header_regex;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users"))
            .and(header_regex("authorization", r"^Bearer ey[\w-]+\.[\w-]+\.[\w-]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let factory = ManagementClientFactory::new(
            &server.uri(),
            "client-1",
            "c2VjcmV0",
            Duration::from_secs(60),
        )
        .unwrap();
        let client = factory
            .create_client("User", &TokenScopes::defaults())
            .unwrap();
        let page = client.get_users(&UserQuery::default()).await.unwrap();
        assert!(page.users.is_empty());
    }
}
