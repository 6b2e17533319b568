//! Tabula Core - in-memory tables and the SQL-subset query engine
//!
//! This crate provides the backend-independent pieces of the data layer:
//! - the value sanitizer applied to every row leaving a connector
//! - the in-memory `Table` model shared by the flat-file connectors
//! - a tokenizer, parser and evaluator for a constrained SELECT dialect

pub mod engine;
pub mod error;
pub mod filter;
pub mod lexer;
pub mod parser;
pub mod sanitize;
pub mod table;

pub use engine::{resolve_table, run_query, sql_like_match, ResultSet, TabularEngine};
pub use error::QueryError;
pub use filter::EqualityQuery;
pub use parser::{parse_select, SelectStatement};
pub use sanitize::{sanitize, sanitize_row, RawValue, Row};
pub use table::{names_match, Cell, Table};
