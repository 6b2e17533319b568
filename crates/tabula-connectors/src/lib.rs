//! Tabula Connectors - one read-only contract over heterogeneous sources
//!
//! This crate provides connectors for:
//! - PostgreSQL, MySQL and SQLite (via sqlx)
//! - MongoDB
//! - Excel workbooks and CSV files (queried through `tabula_core`'s engine)
//!
//! Every row leaving a connector has been passed through the value sanitizer.

pub mod config;
pub mod csv_connector;
pub mod error;
pub mod excel;
pub mod factory;
pub mod flat_file;
pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod schema;
pub mod session;
pub mod sql;
pub mod sqlite;

pub use config::ConnectionConfig;
pub use csv_connector::CsvConnector;
pub use error::ConnectorError;
pub use excel::ExcelConnector;
pub use factory::{create_connector, default_registry, ConnectorFactory, ConnectorRegistry};
pub use mongo::MongoConnector;
pub use mysql::MySqlConnector;
pub use postgres::PostgresConnector;
pub use schema::{introspect, ColumnInfo, SchemaSnapshot, TableSchema};
pub use session::{test_connection, with_connection, ConnectionTestResult};
pub use sqlite::SqliteConnector;
pub use tabula_core::Row;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

/// Row count used by `get_sample_data` callers that have no preference.
pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

/// Uniform read-only access to one data source.
///
/// A connector is used by one caller at a time. `connect` must succeed
/// before the query methods are called; they return
/// [`ConnectorError::NotConnected`] otherwise.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable backend label, e.g. `PostgreSQL`.
    fn database_type(&self) -> &'static str;

    /// Open the connection. Failures are recorded in [`Connector::last_error`]
    /// and logged rather than returned.
    async fn connect(&mut self) -> bool;

    /// Release the connection. Safe to call repeatedly.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Why the most recent `connect` failed, if it did.
    fn last_error(&self) -> Option<&ConnectorError>;

    /// Table, collection or sheet names in backend discovery order.
    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError>;

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError>;

    async fn get_sample_data(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError>;

    /// Run a query in the backend's dialect: SQL for the SQL engines, a JSON
    /// find request for MongoDB, and the SELECT subset or a JSON equality
    /// query for flat files. `params` bind positionally where supported.
    async fn execute_query(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError>;

    /// Snapshot of every table with its columns and up to three sample rows.
    async fn get_schema_info(&self) -> Result<SchemaSnapshot, ConnectorError> {
        introspect(self).await
    }
}

/// Store the outcome of a connect attempt and log it.
pub(crate) fn settle_connect<T>(
    backend: &str,
    target: &str,
    result: Result<T, ConnectorError>,
    handle: &mut Option<T>,
    last_error: &mut Option<ConnectorError>,
) -> bool {
    match result {
        Ok(opened) => {
            info!("{} connected to {}", backend, target);
            *handle = Some(opened);
            *last_error = None;
            true
        }
        Err(e) => {
            error!("{} connection error: {}", backend, e);
            *handle = None;
            *last_error = Some(e);
            false
        }
    }
}
