//! Typed errors for the connectors crate.
//!
//! Driver errors are converted here so nothing backend-specific leaks past
//! the `Connector` boundary.

use std::fmt;

use tabula_core::QueryError;

/// Backend error messages are cut to this many characters.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Errors that can occur in data source connectors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorError {
    /// Failed to establish a connection to the data source.
    ConnectionFailed(String),
    /// No connector is registered for the backend id.
    UnsupportedBackend(String),
    /// A query against the data source failed.
    QueryFailed(String),
    /// A table or sheet name could not be matched.
    SchemaResolution(String),
    /// Invalid or missing configuration.
    ConfigError(String),
    /// An operation needed an open connection.
    NotConnected(&'static str),
}

impl ConnectorError {
    /// Build a `QueryFailed` with the backend message truncated.
    pub fn query(message: impl fmt::Display) -> Self {
        ConnectorError::QueryFailed(truncate(&message.to_string()))
    }

    pub fn connection(message: impl fmt::Display) -> Self {
        ConnectorError::ConnectionFailed(truncate(&message.to_string()))
    }

    /// Whether retrying with a corrected config or query can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectorError::UnsupportedBackend(_))
    }
}

fn truncate(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            ConnectorError::UnsupportedBackend(id) => write!(f, "unsupported backend: {}", id),
            ConnectorError::QueryFailed(msg) => write!(f, "query failed: {}", msg),
            ConnectorError::SchemaResolution(msg) => write!(f, "schema resolution failed: {}", msg),
            ConnectorError::ConfigError(msg) => write!(f, "config error: {}", msg),
            ConnectorError::NotConnected(backend) => write!(f, "{} connector is not connected", backend),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<sqlx::Error> for ConnectorError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ConnectorError::connection(e),
            other => ConnectorError::query(other),
        }
    }
}

impl From<mongodb::error::Error> for ConnectorError {
    fn from(e: mongodb::error::Error) -> Self {
        ConnectorError::query(e)
    }
}

impl From<calamine::Error> for ConnectorError {
    fn from(e: calamine::Error) -> Self {
        ConnectorError::query(e)
    }
}

impl From<csv::Error> for ConnectorError {
    fn from(e: csv::Error) -> Self {
        ConnectorError::query(e)
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::query(format!("invalid query JSON: {}", e))
    }
}

impl From<QueryError> for ConnectorError {
    fn from(e: QueryError) -> Self {
        ConnectorError::query(e)
    }
}
