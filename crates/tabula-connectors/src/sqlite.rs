//! SQLite connector. Opens the database file read-only.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tabula_core::{sanitize_row, RawValue, Row};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::schema::ColumnInfo;
use crate::sql::{bind_json_params, decode_as, quote_ident};
use crate::{settle_connect, Connector};

const MEMORY_DATABASE: &str = ":memory:";

pub struct SqliteConnector {
    config: ConnectionConfig,
    pool: Option<SqlitePool>,
    last_error: Option<ConnectorError>,
}

impl SqliteConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: None,
            last_error: None,
        }
    }

    /// Options for the file named by `database`. A missing file is an error
    /// rather than a new empty database.
    pub fn connect_options(config: &ConnectionConfig) -> Result<SqliteConnectOptions, ConnectorError> {
        let path = config.require_str("database")?;
        if path == MEMORY_DATABASE {
            return SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| ConnectorError::ConfigError(e.to_string()));
        }
        Ok(SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(false)
            .read_only(true))
    }

    async fn open(&self) -> Result<SqlitePool, ConnectorError> {
        let options = Self::connect_options(&self.config)?;
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(ConnectorError::connection)
    }

    fn pool(&self) -> Result<&SqlitePool, ConnectorError> {
        self.pool
            .as_ref()
            .ok_or(ConnectorError::NotConnected(self.database_type()))
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn database_type(&self) -> &'static str {
        "SQLite"
    }

    async fn connect(&mut self) -> bool {
        let target = self.config.get_str("database").ok().flatten().unwrap_or_default();
        let result = self.open().await;
        settle_connect(
            self.database_type(),
            &target,
            result,
            &mut self.pool,
            &mut self.last_error,
        )
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("SQLite connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    fn last_error(&self) -> Option<&ConnectorError> {
        self.last_error.as_ref()
    }

    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(self.pool()?)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT name, type, \"notnull\" FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(self.pool()?)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type, not_null)| ColumnInfo::new(name, data_type, not_null == 0))
            .collect())
    }

    async fn get_sample_data(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        let sql = format!("SELECT * FROM {} LIMIT ?", quote_ident(table, '"'));
        debug!("SQLite sample query: {}", sql);
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute_query(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        debug!("SQLite query with {} params: {}", params.len(), query);
        let rows = bind_json_params(sqlx::query(query), params)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &SqliteRow) -> Row {
    sanitize_row(
        row.columns()
            .iter()
            .map(|col| (col.name().to_string(), decode_value(row, col.ordinal()))),
    )
}

/// SQLite reports the storage class of each value, not the declared type.
fn decode_value(row: &SqliteRow, idx: usize) -> RawValue {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return RawValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return RawValue::Null,
    };
    match type_name.as_str() {
        "INTEGER" => decode_as(row, idx, &type_name, RawValue::Int),
        "REAL" | "NUMERIC" => decode_as(row, idx, &type_name, RawValue::Float),
        "BOOLEAN" => decode_as(row, idx, &type_name, RawValue::Bool),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => decode_as(row, idx, &type_name, RawValue::Text),
        "BLOB" => decode_as(row, idx, &type_name, RawValue::Bytes),
        _ => RawValue::Unsupported(type_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_is_required() {
        assert!(matches!(
            SqliteConnector::connect_options(&ConnectionConfig::new()),
            Err(ConnectorError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let mut connector =
            SqliteConnector::new(ConnectionConfig::new().with("database", path.to_string_lossy().to_string()));
        assert!(!connector.connect().await);
        assert!(matches!(
            connector.last_error(),
            Some(ConnectorError::ConnectionFailed(_))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let mut connector = SqliteConnector::new(ConnectionConfig::new().with("database", ":memory:"));
        assert!(connector.connect().await);
        let rows = connector
            .execute_query(
                "SELECT ? AS n, ? AS label, ? AS missing, x'0102' AS blob, 2.5 AS ratio",
                &[serde_json::json!(7), serde_json::json!("amphora"), Value::Null],
            )
            .await
            .unwrap();
        assert_eq!(
            Value::Object(rows[0].clone()),
            serde_json::json!({
                "n": 7,
                "label": "amphora",
                "missing": null,
                "blob": "<binary:2 bytes>",
                "ratio": 2.5
            })
        );
        assert!(connector.get_tables().await.unwrap().is_empty());
        connector.disconnect().await;
        assert!(!connector.is_connected());
    }
}
