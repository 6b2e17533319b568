//! PostgreSQL connector.
//!
//! Holds a single-connection pool for the lifetime of the session. Tables
//! are listed from `information_schema` for the `public` schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tabula_core::{sanitize_row, RawValue, Row};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::schema::ColumnInfo;
use crate::sql::{bind_json_params, decode_as, is_spatial_type, quote_ident};
use crate::{settle_connect, Connector};

pub const DEFAULT_PORT: u16 = 5432;

/// Only the `public` schema is listed.
const TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = 'public' \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, is_nullable::text \
     FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 \
     ORDER BY ordinal_position";

pub struct PostgresConnector {
    config: ConnectionConfig,
    pool: Option<PgPool>,
    last_error: Option<ConnectorError>,
}

impl PostgresConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: None,
            last_error: None,
        }
    }

    /// Build connect options from `host`, `port`, `database`, `user` and
    /// `password`. Host defaults to `localhost` and port to 5432.
    pub fn connect_options(config: &ConnectionConfig) -> Result<PgConnectOptions, ConnectorError> {
        let mut options = PgConnectOptions::new()
            .host(&config.str_or("host", "localhost")?)
            .port(config.u16_or("port", DEFAULT_PORT)?);
        if let Some(database) = config.get_str("database")? {
            options = options.database(&database);
        }
        if let Some(user) = config.get_str("user")? {
            options = options.username(&user);
        }
        if let Some(password) = config.get_str("password")? {
            options = options.password(&password);
        }
        Ok(options)
    }

    async fn open(&self) -> Result<PgPool, ConnectorError> {
        let options = Self::connect_options(&self.config)?;
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.config.connect_timeout()?)
            .connect_with(options)
            .await
            .map_err(ConnectorError::connection)
    }

    fn pool(&self) -> Result<&PgPool, ConnectorError> {
        self.pool
            .as_ref()
            .ok_or(ConnectorError::NotConnected(self.database_type()))
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn database_type(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn connect(&mut self) -> bool {
        let target = format!(
            "{}:{}",
            self.config.str_or("host", "localhost").unwrap_or_default(),
            self.config.u16_or("port", DEFAULT_PORT).unwrap_or(DEFAULT_PORT)
        );
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
            debug!("PostgreSQL connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    fn last_error(&self) -> Option<&ConnectorError> {
        self.last_error.as_ref()
    }

    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let rows: Vec<(String,)> = sqlx::query_as(TABLES_SQL)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(COLUMNS_SQL)
            .bind(table)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable)| ColumnInfo {
                name,
                data_type,
                nullable,
            })
            .collect())
    }

    async fn get_sample_data(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        let sql = format!("SELECT * FROM {} LIMIT $1", quote_ident(table, '"'));
        debug!("PostgreSQL sample query: {}", sql);
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute_query(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        debug!("PostgreSQL query with {} params: {}", params.len(), query);
        let rows = bind_json_params(sqlx::query(query), params)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &PgRow) -> Row {
    sanitize_row(
        row.columns()
            .iter()
            .map(|col| (col.name().to_string(), decode_value(row, col.ordinal()))),
    )
}

fn decode_value(row: &PgRow, idx: usize) -> RawValue {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return RawValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return RawValue::Null,
    };
    if is_spatial_type(&type_name) {
        return RawValue::Geometry;
    }
    match type_name.as_str() {
        "BOOL" => decode_as(row, idx, &type_name, RawValue::Bool),
        "INT2" => decode_as(row, idx, &type_name, |v: i16| RawValue::Int(v.into())),
        "INT4" => decode_as(row, idx, &type_name, |v: i32| RawValue::Int(v.into())),
        "INT8" => decode_as(row, idx, &type_name, RawValue::Int),
        "FLOAT4" => decode_as(row, idx, &type_name, |v: f32| RawValue::Float(v.into())),
        "FLOAT8" => decode_as(row, idx, &type_name, RawValue::Float),
        "NUMERIC" => decode_as(row, idx, &type_name, RawValue::Decimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            decode_as(row, idx, &type_name, RawValue::Text)
        }
        "UUID" => decode_as(row, idx, &type_name, |v: uuid::Uuid| RawValue::Text(v.to_string())),
        "JSON" | "JSONB" => decode_as(row, idx, &type_name, RawValue::Json),
        "DATE" => decode_as(row, idx, &type_name, RawValue::Date),
        "TIME" => decode_as(row, idx, &type_name, RawValue::Time),
        "TIMESTAMP" => decode_as(row, idx, &type_name, RawValue::DateTime),
        "TIMESTAMPTZ" => decode_as(row, idx, &type_name, |v: DateTime<Utc>| {
            RawValue::DateTimeTz(v.fixed_offset())
        }),
        "BYTEA" => decode_as(row, idx, &type_name, RawValue::Bytes),
        "TEXT[]" | "VARCHAR[]" => decode_as(row, idx, &type_name, |v: Vec<String>| {
            RawValue::List(v.into_iter().map(RawValue::Text).collect())
        }),
        "INT4[]" => decode_as(row, idx, &type_name, |v: Vec<i32>| {
            RawValue::List(v.into_iter().map(|n| RawValue::Int(n.into())).collect())
        }),
        "INT8[]" => decode_as(row, idx, &type_name, |v: Vec<i64>| {
            RawValue::List(v.into_iter().map(RawValue::Int).collect())
        }),
        "FLOAT8[]" => decode_as(row, idx, &type_name, |v: Vec<f64>| {
            RawValue::List(v.into_iter().map(RawValue::Float).collect())
        }),
        "BOOL[]" => decode_as(row, idx, &type_name, |v: Vec<bool>| {
            RawValue::List(v.into_iter().map(RawValue::Bool).collect())
        }),
        _ => RawValue::Unsupported(type_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_defaults() {
        let options = PostgresConnector::connect_options(&ConnectionConfig::new()).unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), DEFAULT_PORT);
    }

    #[test]
    fn test_connect_options_from_config() {
        let config = ConnectionConfig::new()
            .with("host", "db.internal")
            .with("port", "6543")
            .with("database", "archive")
            .with("user", "reader");
        let options = PostgresConnector::connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("archive"));
        assert_eq!(options.get_username(), "reader");
    }

    #[test]
    fn test_catalog_queries_share_schema() {
        for sql in [TABLES_SQL, COLUMNS_SQL] {
            assert!(sql.contains("table_schema = 'public'"), "{}", sql);
        }
        assert!(COLUMNS_SQL.contains("table_name = $1"));
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let config = ConnectionConfig::new().with("port", "five");
        assert!(matches!(
            PostgresConnector::connect_options(&config),
            Err(ConnectorError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_queries_require_connection() {
        let connector = PostgresConnector::new(ConnectionConfig::new());
        assert!(!connector.is_connected());
        assert!(matches!(
            connector.get_tables().await,
            Err(ConnectorError::NotConnected("PostgreSQL"))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let mut connector = PostgresConnector::new(ConnectionConfig::new());
        connector.disconnect().await;
        connector.disconnect().await;
        assert!(!connector.is_connected());
    }
}
