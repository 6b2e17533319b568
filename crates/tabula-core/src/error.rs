//! Errors raised by the tabular query engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Cannot parse query: {0}")]
    Parse(String),

    #[error("Cannot parse FROM clause in query")]
    MissingFrom,

    #[error("Table '{0}' not found: no tables are loaded")]
    NoTables(String),

    #[error("Query is missing a 'table' or 'sheet' name")]
    MissingTable,

    #[error("Invalid JSON query: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
