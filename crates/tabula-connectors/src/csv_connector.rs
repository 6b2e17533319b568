//! CSV connector.
//!
//! `file_path` names either one `.csv` file (one table named after the file
//! stem) or a directory, in which case every `*.csv` file inside it becomes
//! a table, ordered by file name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tabula_core::{Cell, Row, Table};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::flat_file::{header_names, LoadedTables};
use crate::schema::ColumnInfo;
use crate::{settle_connect, Connector};

pub struct CsvConnector {
    config: ConnectionConfig,
    loaded: Option<LoadedTables>,
    last_error: Option<ConnectorError>,
}

impl CsvConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            loaded: None,
            last_error: None,
        }
    }

    async fn open(&self) -> Result<LoadedTables, ConnectorError> {
        let path = PathBuf::from(self.config.require_str("file_path")?);
        tokio::task::spawn_blocking(move || load_path(&path))
            .await
            .map_err(ConnectorError::connection)?
    }

    fn loaded(&self) -> Result<&LoadedTables, ConnectorError> {
        self.loaded
            .as_ref()
            .ok_or(ConnectorError::NotConnected(self.database_type()))
    }
}

/// Load a single file or every `*.csv` file of a directory.
pub fn load_path(path: &Path) -> Result<LoadedTables, ConnectorError> {
    if !path.is_dir() {
        let table = load_csv_file(path).map_err(ConnectorError::connection)?;
        return Ok(LoadedTables::new(vec![table]));
    }

    let entries = std::fs::read_dir(path).map_err(|e| {
        ConnectorError::connection(format!("cannot read directory {}: {}", path.display(), e))
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();

    let mut tables = Vec::with_capacity(files.len());
    for file in &files {
        tables.push(load_csv_file(file).map_err(ConnectorError::connection)?);
    }
    info!(
        "Loaded {} CSV tables from directory {}",
        tables.len(),
        path.display()
    );
    Ok(LoadedTables::new(tables))
}

/// Read one CSV file into a typed table named after the file stem.
pub fn load_csv_file(path: &Path) -> Result<Table, csv::Error> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = header_names(rdr.headers()?.iter().map(|h| h.to_string()));

    let mut table = Table::new(name, columns);
    for record in rdr.records() {
        let record = record?;
        table.push_row(record.iter().map(Cell::infer).collect());
    }
    debug!(
        "Read CSV {} ({} columns, {} rows)",
        path.display(),
        table.columns().len(),
        table.len()
    );
    Ok(table)
}

#[async_trait]
impl Connector for CsvConnector {
    fn database_type(&self) -> &'static str {
        "CSV"
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
            debug!("CSV tables released");
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
