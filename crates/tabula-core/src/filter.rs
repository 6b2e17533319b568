//! JSON equality queries for flat-file sources.
//!
//! ```json
//! {"table": "Pottery", "filters": {"site": "Corinth", "period": 3}}
//! ```
//!
//! `sheet` is accepted as an alias of `table`. Every filter must match with
//! typed equality; filters naming unknown columns are ignored.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::engine::{resolve_table, ResultSet};
use crate::error::QueryError;
use crate::table::Table;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EqualityQuery {
    #[serde(default, alias = "sheet")]
    pub table: Option<String>,
    #[serde(default)]
    pub filters: Map<String, Value>,
}

impl EqualityQuery {
    pub fn from_json(text: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn execute(&self, tables: &[Table]) -> Result<ResultSet, QueryError> {
        let name = self.table.as_deref().ok_or(QueryError::MissingTable)?;
        let Some(table) = resolve_table(tables, name) else {
            warn!("Table '{}' not found, returning no rows", name);
            return Ok(ResultSet::empty());
        };

        let filters: Vec<(usize, &Value)> = self
            .filters
            .iter()
            .filter_map(|(column, value)| match table.resolve_column(column) {
                Some(idx) => Some((idx, value)),
                None => {
                    warn!("Filter column '{}' not found in '{}', ignoring it", column, table.name());
                    None
                }
            })
            .collect();

        let rows = table
            .rows()
            .iter()
            .filter(|row| filters.iter().all(|(idx, value)| row[*idx].matches_json(value)))
            .cloned()
            .collect();

        Ok(ResultSet {
            columns: table.columns().to_vec(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn finds() -> Vec<Table> {
        vec![Table::new(
            "Finds",
            vec!["site".to_string(), "period".to_string(), "glazed".to_string()],
        )
        .with_rows(vec![
            vec![Cell::Text("Corinth".into()), Cell::Int(3), Cell::Bool(true)],
            vec![Cell::Text("Athens".into()), Cell::Int(3), Cell::Bool(false)],
            vec![Cell::Text("Corinth".into()), Cell::Int(4), Cell::Null],
        ])]
    }

    #[test]
    fn test_deserialize_sheet_alias() {
        let q = EqualityQuery::from_json(r#"{"sheet": "Finds"}"#).unwrap();
        assert_eq!(q.table.as_deref(), Some("Finds"));
        assert!(q.filters.is_empty());
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let q = EqualityQuery::from_json(r#"{"table": "finds", "filters": {"SITE": "Corinth", "period": 3}}"#)
            .unwrap();
        let result = q.execute(&finds()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0][2], Cell::Bool(true));
    }

    #[test]
    fn test_null_and_bool_filters() {
        let q = EqualityQuery::from_json(r#"{"table": "Finds", "filters": {"glazed": null}}"#).unwrap();
        assert_eq!(q.execute(&finds()).unwrap().len(), 1);
        let q = EqualityQuery::from_json(r#"{"table": "Finds", "filters": {"glazed": false}}"#).unwrap();
        assert_eq!(q.execute(&finds()).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_filter_column_is_ignored() {
        let q = EqualityQuery::from_json(r#"{"table": "Finds", "filters": {"colour": "red"}}"#).unwrap();
        assert_eq!(q.execute(&finds()).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_table_returns_nothing() {
        let q = EqualityQuery::from_json(r#"{"table": "Coins"}"#).unwrap();
        let result = q.execute(&finds()).unwrap();
        assert!(result.is_empty());
        assert!(result.columns.is_empty());
    }

    #[test]
    fn test_missing_table_is_error() {
        let q = EqualityQuery::from_json(r#"{"filters": {}}"#).unwrap();
        assert!(matches!(q.execute(&finds()), Err(QueryError::MissingTable)));
    }
}
