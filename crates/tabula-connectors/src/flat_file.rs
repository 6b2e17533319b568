//! Shared glue for connectors backed by in-memory tables (CSV, Excel).
//!
//! Files are read once at `connect`; every later call works on the loaded
//! tables and queries run through `tabula_core`'s engine.

use std::collections::{HashMap, HashSet};

use tabula_core::{resolve_table, run_query, ResultSet, Row, Table};
use tracing::debug;

use crate::error::ConnectorError;
use crate::schema::ColumnInfo;

/// Tables loaded from one file or directory, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct LoadedTables {
    tables: Vec<Table>,
}

impl LoadedTables {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name().to_string()).collect()
    }

    /// Look a table up by name, exact match first, then case-insensitive.
    pub fn table(&self, name: &str) -> Result<&Table, ConnectorError> {
        resolve_table(&self.tables, name)
            .ok_or_else(|| ConnectorError::SchemaResolution(format!("table '{}' not found", name)))
    }

    /// Columns with inferred type labels. Nullability is always `YES`.
    pub fn columns(&self, name: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        let table = self.table(name)?;
        Ok(table
            .columns()
            .iter()
            .zip(table.column_types())
            .map(|(column, data_type)| ColumnInfo::new(column.clone(), data_type, true))
            .collect())
    }

    pub fn sample(&self, name: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        let table = self.table(name)?;
        let head = table.rows().iter().take(limit).cloned().collect();
        let result = ResultSet {
            columns: table.columns().to_vec(),
            rows: head,
        };
        Ok(result.into_rows())
    }

    /// Run a `SELECT` statement or a JSON equality query.
    pub fn query(&self, query: &str) -> Result<Vec<Row>, ConnectorError> {
        let result = run_query(&self.tables, query)?;
        debug!("Flat-file query returned {} rows", result.len());
        Ok(result.into_rows())
    }
}

/// Clean up a header row: blank names become `Unnamed: N` and repeated
/// names get a `.1`, `.2`, ... suffix that does not collide with any other
/// header.
pub fn header_names<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let bases: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                trimmed.to_string()
            }
        })
        .collect();

    let mut taken: HashSet<String> = bases.iter().cloned().collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    bases
        .iter()
        .map(|base| {
            if seen.insert(base.as_str()) {
                return base.clone();
            }
            let count = counts.entry(base.as_str()).or_insert(0);
            loop {
                *count += 1;
                let candidate = format!("{}.{}", base, count);
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_core::Cell;

    fn loaded() -> LoadedTables {
        LoadedTables::new(vec![
            Table::new("Pottery", vec!["Id".to_string(), "Name".to_string()]).with_rows(vec![
                vec![Cell::Int(1), Cell::Text("Amphora".into())],
                vec![Cell::Int(2), Cell::Text("bowl".into())],
                vec![Cell::Int(3), Cell::Null],
            ]),
            Table::new("Sites", vec!["site".to_string()]),
        ])
    }

    #[test]
    fn test_header_names() {
        let names = header_names(vec![
            " id ".to_string(),
            "".to_string(),
            "name".to_string(),
            "name".to_string(),
        ]);
        assert_eq!(names, vec!["id", "Unnamed: 1", "name", "name.1"]);
    }

    #[test]
    fn test_header_suffix_skips_existing_names() {
        let names = header_names(vec!["a".to_string(), "a".to_string(), "a.1".to_string()]);
        assert_eq!(names, vec!["a", "a.2", "a.1"]);

        let names = header_names(vec![
            "a".to_string(),
            "a.1".to_string(),
            "a".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(names, vec!["a", "a.1", "a.2", "a.3"]);
    }

    #[test]
    fn test_columns_and_names() {
        let tables = loaded();
        assert_eq!(tables.names(), vec!["Pottery", "Sites"]);
        let columns = tables.columns("pottery").unwrap();
        assert_eq!(columns[0], ColumnInfo::new("Id", "int64", true));
        assert_eq!(columns[1], ColumnInfo::new("Name", "object", true));
    }

    #[test]
    fn test_unknown_table_is_schema_error() {
        assert!(matches!(
            loaded().columns("Coins"),
            Err(ConnectorError::SchemaResolution(_))
        ));
        assert!(loaded().sample("Coins", 3).is_err());
    }

    #[test]
    fn test_sample_limits_rows() {
        let rows = loaded().sample("Pottery", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(serde_json::Value::Object(rows[0].clone()), json!({"Id": 1, "Name": "Amphora"}));
    }

    #[test]
    fn test_query_errors_become_query_failed() {
        assert!(matches!(
            loaded().query("SELECT Id"),
            Err(ConnectorError::QueryFailed(_))
        ));
    }
}
