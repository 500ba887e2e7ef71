use thiserror::Error;

use crate::{client::ClientError, config::ConfigError, filter::FilterError};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("An id is required to update a record")]
    MissingId,

    #[error("Could not update attributes: record {0} does not exist")]
    NotFound(String),

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Remote(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
