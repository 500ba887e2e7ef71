//! Data-access connector mapping an application object model onto the Auth0
//! user directory.
//!
//! The pieces, bottom-up:
//!
//! - [`object`]: dotted-path access, extraction and key rewriting on JSON records
//! - [`mapping`]: bidirectional field-name tables, per model
//! - [`filter`]: the filter language, its compiler to the directory's
//!   Lucene-style query grammar, and request options
//! - [`attributes`]: outbound record construction and inbound normalization
//! - [`cache`]: TTL memoization
//! - [`client`]: the management API client and token signing
//! - [`config`]: TOML configuration
//! - [`connector`]: the persistence operations tying it all together

pub mod attributes;
pub mod cache;
pub mod client;
pub mod config;
pub mod connector;
pub mod filter;
pub mod mapping;
pub mod object;
#[cfg(feature = "cli")]
pub mod observability;

pub use attributes::{AttributeSource, SerializeOptions};
pub use client::{ClientError, ClientFactory, DirectoryClient, TokenScopes};
pub use config::{ConfigError, ConnectorConfig};
pub use connector::{
    Connector, ConnectorError, ConnectorResult, ConnectorSettings, CountResult, CreateResult,
    SaveOutcome,
};
pub use filter::{Filter, FilterError, QueryFilter, UserQuery, compile};
pub use mapping::{FieldMapper, FieldMapping};
pub use object::Record;
