//! Management API token scopes and signing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Permission set requested for a client handle: resource → actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenScopes(BTreeMap<String, Vec<String>>);

const CRUD: [&str; 4] = ["create", "read", "update", "delete"];

impl TokenScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full user and app-metadata access.
    pub fn defaults() -> Self {
        let mut scopes = Self::new();
        scopes.grant("users", CRUD);
        scopes.grant("users_app_metadata", CRUD);
        scopes
    }

    pub fn grant<I, S>(&mut self, resource: impl Into<String>, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(resource.into(), actions.into_iter().map(Into::into).collect());
    }

    /// Overlay `other`; its resources replace ours wholesale.
    pub fn merged(&self, other: &TokenScopes) -> TokenScopes {
        let mut merged = self.clone();
        merged
            .0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn actions(&self, resource: &str) -> Option<&[String]> {
        self.0.get(resource).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeActions {
    pub actions: Vec<String>,
}

/// Claims of a self-signed management API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTokenClaims {
    pub aud: String,
    pub scopes: BTreeMap<String, ScopeActions>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl ApiTokenClaims {
    pub fn new(client_id: &str, scopes: &TokenScopes, lifetime: std::time::Duration) -> Self {
        let iat = chrono::Utc::now().timestamp();
        let lifetime_secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        Self {
            aud: client_id.to_string(),
            scopes: scopes
                .iter()
                .map(|(resource, actions)| {
                    (
                        resource.to_string(),
                        ScopeActions {
                            actions: actions.to_vec(),
                        },
                    )
                })
                .collect(),
            iat,
            exp: iat.saturating_add(lifetime_secs),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Sign `claims` with HS256.
///
/// Client secrets are issued base64-encoded; a secret that does not decode is
/// used as raw bytes.
#[cfg(feature = "jwt")]
pub fn sign_api_token(
    claims: &ApiTokenClaims,
    client_secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    let key = EncodingKey::from_base64_secret(client_secret)
        .unwrap_or_else(|_| EncodingKey::from_secret(client_secret.as_bytes()));
    encode(&Header::new(Algorithm::HS256), claims, &key)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_scopes() {
        let scopes = TokenScopes::defaults();
        assert_eq!(
            scopes.actions("users"),
            Some(&["create", "read", "update", "delete"].map(String::from)[..])
        );
        assert!(scopes.actions("users_app_metadata").is_some());
    }

    #[test]
    fn test_merged_replaces_whole_resource() {
        let mut narrow = TokenScopes::new();
        narrow.grant("users", ["read"]);
        narrow.grant("clients", ["read"]);

        let merged = TokenScopes::defaults().merged(&narrow);
        assert_eq!(merged.actions("users"), Some(&["read".to_string()][..]));
        assert_eq!(merged.actions("clients"), Some(&["read".to_string()][..]));
        assert_eq!(merged.actions("users_app_metadata").map(<[_]>::len), Some(4));
    }

    #[test]
    fn test_claims() {
        let claims = ApiTokenClaims::new("client-1", &TokenScopes::defaults(), Duration::from_secs(3600));
        assert_eq!(claims.aud, "client-1");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.scopes["users"].actions.len(), 4);
        assert_eq!(claims.jti.len(), 32);
    }

    #[cfg(feature = "jwt")]
    #[test]
    fn test_sign_api_token_round_trip() {
        use jsonwebtoken::{DecodingKey, Validation, decode};

        let claims = ApiTokenClaims::new("client-1", &TokenScopes::defaults(), Duration::from_secs(60));
        let token = sign_api_token(&claims, "not base64 at all!").unwrap();

        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_audience(&["client-1"]);
        let decoded = decode::<ApiTokenClaims>(
            &token,
            &DecodingKey::from_secret(b"not base64 at all!"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims, claims);
    }
}
