//! Field mapping tables.
//!
//! A [`FieldMapping`] maps a source field name to a target dotted path. Tables
//! are named by the direction records flow through them:
//!
//! - **serialize**: caller name → remote path (`favoriteColor` →
//!   `user_metadata.favoriteColor`)
//! - **normalize**: remote path → caller name
//!
//! Either direction can be configured explicitly, or derived as the inverse of
//! the other. Inversion requires an injective table; a duplicate target is a
//! configuration error rather than a silent collapse.

mod resolve;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use resolve::{FieldMapper, MappingScope, ResolvedMappings};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error(
        "fields `{first}` and `{second}` both map to `{target}`; \
         map one of them to an empty string or supply the inverse table explicitly"
    )]
    DuplicateTarget {
        target: String,
        first: String,
        second: String,
    },
}

pub type MappingResult<T> = Result<T, MappingError>;

/// Which way a record (or a field name) is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingDirection {
    /// Remote → caller.
    Normalize,
    /// Caller → remote.
    Serialize,
}

impl MappingDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Normalize => Self::Serialize,
            Self::Serialize => Self::Normalize,
        }
    }
}

/// A single-direction mapping table. An empty target drops the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Built-in caller → remote table for the user directory.
    pub fn builtin() -> Self {
        Self::from_pairs([
            ("id", "user_id"),
            ("username", "username"),
            ("name", "name"),
            ("nickname", "nickname"),
            ("picture", "picture"),
            ("password", "password"),
            ("verifyPassword", "verify_password"),
            ("email", "email"),
            ("emailVerified", "email_verified"),
            ("verifyEmail", "verify_email"),
            ("phoneNumber", "phone_number"),
            ("phoneVerified", "phone_verified"),
            ("verifyPhoneNumber", "verify_phone_number"),
            ("givenName", "given_name"),
            ("familyName", "family_name"),
            ("identities", "identities"),
            ("createdAt", "created_at"),
            ("updatedAt", "updated_at"),
            ("clientId", "client_id"),
            ("lastIp", "last_ip"),
            ("lastLogin", "last_login"),
            ("loginsCount", "logins_count"),
        ])
    }

    /// Mapped target for `name`, ignoring dropped (empty) entries.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|target| !target.is_empty())
    }

    /// Mapped target for `name`, or `name` itself when unmapped.
    pub fn apply(&self, name: &str) -> String {
        self.get(name).unwrap_or(name).to_string()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.0.insert(from.into(), to.into());
    }

    /// Overlay `other` onto this table. Entries in `other` win.
    pub fn extend(&mut self, other: &FieldMapping) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn extended(mut self, other: &FieldMapping) -> Self {
        self.extend(other);
        self
    }

    /// Swap keys and values.
    pub fn invert(&self) -> MappingResult<FieldMapping> {
        let mut inverse: BTreeMap<String, String> = BTreeMap::new();
        for (from, to) in self.iter() {
            if let Some(existing) = inverse.get(to) {
                return Err(MappingError::DuplicateTarget {
                    target: to.to_string(),
                    first: existing.clone(),
                    second: from.to_string(),
                });
            }
            inverse.insert(to.to_string(), from.to_string());
        }
        Ok(Self(inverse))
    }

    /// Live `(from, to)` pairs, skipping dropped entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(from, to)| !from.is_empty() && !to.is_empty())
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMapping {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
