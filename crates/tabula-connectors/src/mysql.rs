//! MySQL connector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tabula_core::{sanitize_row, RawValue, Row};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::schema::ColumnInfo;
use crate::sql::{bind_json_params, decode_as, is_spatial_type, quote_ident};
use crate::{settle_connect, Connector};

pub const DEFAULT_PORT: u16 = 3306;

pub struct MySqlConnector {
    config: ConnectionConfig,
    pool: Option<MySqlPool>,
    last_error: Option<ConnectorError>,
}

impl MySqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: None,
            last_error: None,
        }
    }

    pub fn connect_options(config: &ConnectionConfig) -> Result<MySqlConnectOptions, ConnectorError> {
        let mut options = MySqlConnectOptions::new()
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

    async fn open(&self) -> Result<MySqlPool, ConnectorError> {
        let options = Self::connect_options(&self.config)?;
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.config.connect_timeout()?)
            .connect_with(options)
            .await
            .map_err(ConnectorError::connection)
    }

    fn pool(&self) -> Result<&MySqlPool, ConnectorError> {
        self.pool
            .as_ref()
            .ok_or(ConnectorError::NotConnected(self.database_type()))
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn database_type(&self) -> &'static str {
        "MySQL"
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
            debug!("MySQL connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    fn last_error(&self) -> Option<&ConnectorError> {
        self.last_error.as_ref()
    }

    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        // information_schema text columns arrive as binary on MySQL 8 unless cast
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
             WHERE table_schema = DATABASE() \
             ORDER BY table_name",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT CAST(column_name AS CHAR), CAST(column_type AS CHAR), CAST(is_nullable AS CHAR) \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position",
        )
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
        let sql = format!("SELECT * FROM {} LIMIT ?", quote_ident(table, '`'));
        debug!("MySQL sample query: {}", sql);
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute_query(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        debug!("MySQL query with {} params: {}", params.len(), query);
        let rows = bind_json_params(sqlx::query(query), params)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &MySqlRow) -> Row {
    sanitize_row(
        row.columns()
            .iter()
            .map(|col| (col.name().to_string(), decode_value(row, col.ordinal()))),
    )
}

fn decode_value(row: &MySqlRow, idx: usize) -> RawValue {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return RawValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return RawValue::Null,
    };
    if is_spatial_type(&type_name) {
        return RawValue::Geometry;
    }
    if type_name.ends_with("UNSIGNED") {
        return decode_as(row, idx, &type_name, RawValue::UInt);
    }
    match type_name.as_str() {
        "BOOLEAN" => decode_as(row, idx, &type_name, RawValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            decode_as(row, idx, &type_name, RawValue::Int)
        }
        "YEAR" | "BIT" => decode_as(row, idx, &type_name, RawValue::UInt),
        "FLOAT" => decode_as(row, idx, &type_name, |v: f32| RawValue::Float(v.into())),
        "DOUBLE" => decode_as(row, idx, &type_name, RawValue::Float),
        "DECIMAL" => decode_as(row, idx, &type_name, RawValue::Decimal),
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            decode_as(row, idx, &type_name, RawValue::Text)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            decode_as(row, idx, &type_name, RawValue::Bytes)
        }
        "JSON" => decode_as(row, idx, &type_name, RawValue::Json),
        "DATE" => decode_as(row, idx, &type_name, RawValue::Date),
        "TIME" => decode_as(row, idx, &type_name, RawValue::Time),
        "DATETIME" => decode_as(row, idx, &type_name, RawValue::DateTime),
        "TIMESTAMP" => decode_as(row, idx, &type_name, |v: DateTime<Utc>| {
            RawValue::DateTimeTz(v.fixed_offset())
        }),
        _ => RawValue::Unsupported(type_name),
    }
}
