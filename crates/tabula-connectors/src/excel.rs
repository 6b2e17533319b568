//! Excel connector. Each worksheet is a table whose first row is the header.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use tabula_core::{Cell, Row, Table};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::flat_file::{header_names, LoadedTables};
use crate::schema::ColumnInfo;
use crate::{settle_connect, Connector};

pub struct ExcelConnector {
    config: ConnectionConfig,
    loaded: Option<LoadedTables>,
    last_error: Option<ConnectorError>,
}

impl ExcelConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            loaded: None,
            last_error: None,
        }
    }

    async fn open(&self) -> Result<LoadedTables, ConnectorError> {
        let path = PathBuf::from(self.config.require_str("file_path")?);
        tokio::task::spawn_blocking(move || load_workbook(&path))
            .await
            .map_err(ConnectorError::connection)?
    }

    fn loaded(&self) -> Result<&LoadedTables, ConnectorError> {
        self.loaded
            .as_ref()
            .ok_or(ConnectorError::NotConnected(self.database_type()))
    }
}

/// Read every worksheet of a workbook, in workbook order.
pub fn load_workbook(path: &Path) -> Result<LoadedTables, ConnectorError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        ConnectorError::connection(format!("cannot open workbook {}: {}", path.display(), e))
    })?;

    let mut tables = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(ConnectorError::connection)?;
        let mut rows = range.rows();
        let columns = match rows.next() {
            Some(header) => header_names(header.iter().map(|cell| cell.to_string())),
            None => Vec::new(),
        };
        let mut table = Table::new(sheet.clone(), columns);
        for row in rows {
            table.push_row(row.iter().map(to_cell).collect());
        }
        debug!("Read sheet '{}' ({} rows)", sheet, table.len());
        tables.push(table);
    }
    info!("Loaded {} sheets from {}", tables.len(), path.display());
    Ok(LoadedTables::new(tables))
}

/// Map a worksheet value onto a typed cell. Whole floats become integers
/// since Excel stores every number as a double.
pub fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Cell::Int(*f as i64),
        Data::Float(f) => Cell::Float(*f),
        Data::String(s) if s.trim().is_empty() => Cell::Null,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if !dt.is_duration() => Cell::DateTime(value),
            _ => Cell::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => Cell::infer(s),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Null,
    }
}

#[async_trait]
impl Connector for ExcelConnector {
    fn database_type(&self) -> &'static str {
        "Excel"
    }

    async fn connect(&mut self) -> bool {
        let target = self.config.get_str("file_path").ok().flatten().unwrap_or_default();
        let result = self.open().await;
        settle_connect(
            self.database_type(),
            &target,
            result,
            &mut self.loaded,
            &mut self.last_error,
        )
    }

    async fn disconnect(&mut self) {
        if self.loaded.take().is_some() {
            debug!("Excel workbook released");
        }
    }

    fn is_connected(&self) -> bool {
        self.loaded.is_some()
    }

    fn last_error(&self) -> Option<&ConnectorError> {
        self.last_error.as_ref()
    }

    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.loaded()?.names())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        self.loaded()?.columns(table)
    }

    async fn get_sample_data(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        self.loaded()?.sample(table, limit)
    }

    /// Parameters are ignored.
    async fn execute_query(&self, query: &str, _params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        self.loaded()?.query(query)
    }
}
