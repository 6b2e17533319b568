//! Tabular query engine - evaluates parsed SELECT statements against
//! in-memory tables.
//!
//! Resolution is deliberately forgiving: an unknown FROM target falls back to
//! the first loaded table, unresolvable projection columns are dropped, and
//! WHERE leaves on unknown columns evaluate to false. Only an empty table set
//! is a hard error.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::QueryError;
use crate::filter::EqualityQuery;
use crate::parser::{parse_select, ColumnRef, CompareOp, Condition, Distinct, SelectItem};
use crate::sanitize::{sanitize_row, Row};
use crate::table::{names_match, Cell, Table};

/// Output of a query: projected column names and their rows, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert into sanitized rows keyed by output column name.
    pub fn into_rows(self) -> Vec<Row> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|cells| {
                sanitize_row(
                    columns
                        .iter()
                        .cloned()
                        .zip(cells.iter().map(Cell::to_raw)),
                )
            })
            .collect()
    }
}

/// Run a flat-file query: `SELECT ...` goes through the SQL engine, anything
/// else is read as a JSON equality query.
pub fn run_query(tables: &[Table], query: &str) -> Result<ResultSet, QueryError> {
    let trimmed = query.trim_start();
    let is_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"));
    if is_select {
        TabularEngine::new(tables).execute(trimmed)
    } else {
        EqualityQuery::from_json(query)?.execute(tables)
    }
}

/// Case-insensitive table lookup, preferring an exact match.
pub fn resolve_table<'t>(tables: &'t [Table], name: &str) -> Option<&'t Table> {
    tables
        .iter()
        .find(|t| t.name() == name)
        .or_else(|| tables.iter().find(|t| names_match(t.name(), name)))
}

pub struct TabularEngine<'a> {
    tables: &'a [Table],
}

impl<'a> TabularEngine<'a> {
    pub fn new(tables: &'a [Table]) -> Self {
        Self { tables }
    }

    pub fn execute(&self, sql: &str) -> Result<ResultSet, QueryError> {
        let stmt = parse_select(sql)?;

        let table = match resolve_table(self.tables, &stmt.from.name) {
            Some(table) => table,
            None => {
                let first = self
                    .tables
                    .first()
                    .ok_or_else(|| QueryError::NoTables(stmt.from.name.clone()))?;
                warn!(
                    "Table '{}' not found, falling back to '{}'",
                    stmt.from.name,
                    first.name()
                );
                first
            }
        };
        debug!(table = %table.name(), rows = table.len(), "Executing tabular query");

        let predicate = stmt
            .selection
            .as_ref()
            .map(|condition| Predicate::compile(condition, table));
        let projection = Projection::build(&stmt.projection, table);
        let distinct_keys = match &stmt.distinct {
            Distinct::On(keys) => Some(projection.distinct_keys(keys, table)),
            _ => None,
        };

        let mut seen: HashSet<Vec<(bool, String)>> = HashSet::new();
        let mut rows = Vec::new();
        for source in table.rows() {
            if let Some(limit) = stmt.limit {
                if rows.len() >= limit {
                    break;
                }
            }
            if !predicate.as_ref().map_or(true, |p| p.eval(source)) {
                continue;
            }
            let projected = projection.apply(source);
            let key: Option<Vec<(bool, String)>> = match (&stmt.distinct, &distinct_keys) {
                (Distinct::On(_), Some(keys)) if !keys.is_empty() => Some(
                    keys.iter()
                        .map(|k| match k {
                            KeySource::Source(idx) => cell_key(&source[*idx]),
                            KeySource::Output(idx) => cell_key(&projected[*idx]),
                        })
                        .collect(),
                ),
                (Distinct::Rows, _) => Some(projected.iter().map(cell_key).collect()),
                _ => None,
            };
            if let Some(key) = key {
                if !seen.insert(key) {
                    continue;
                }
            }
            rows.push(projected);
        }

        Ok(ResultSet {
            columns: projection.names,
            rows,
        })
    }
}

fn cell_key(cell: &Cell) -> (bool, String) {
    (cell.is_null(), cell.as_text().into_owned())
}

#[derive(Debug, Clone, Copy)]
enum KeySource {
    Source(usize),
    Output(usize),
}

/// Resolved select list: source column index and output name per column.
struct Projection {
    indices: Vec<usize>,
    names: Vec<String>,
}

impl Projection {
    fn build(items: &[SelectItem], table: &Table) -> Self {
        let mut indices = Vec::new();
        let mut names = Vec::new();
        for item in items {
            match item {
                SelectItem::Wildcard => {
                    for (idx, name) in table.columns().iter().enumerate() {
                        indices.push(idx);
                        names.push(name.clone());
                    }
                }
                SelectItem::Column { column, alias } => match table.resolve_column(&column.name) {
                    Some(idx) => {
                        indices.push(idx);
                        names.push(alias.clone().unwrap_or_else(|| table.columns()[idx].clone()));
                    }
                    None => debug!("Skipping unknown column '{}' in select list", column.name),
                },
                SelectItem::Unsupported(expr) => {
                    debug!("Skipping unsupported select expression '{}'", expr)
                }
            }
        }
        if indices.is_empty() {
            debug!("No select columns resolved, returning all columns");
            indices = (0..table.columns().len()).collect();
            names = table.columns().to_vec();
        }
        Self { indices, names }
    }

    fn apply(&self, row: &[Cell]) -> Vec<Cell> {
        self.indices.iter().map(|&idx| row[idx].clone()).collect()
    }

    /// Resolve DISTINCT ON keys against source columns, then output aliases.
    fn distinct_keys(&self, keys: &[ColumnRef], table: &Table) -> Vec<KeySource> {
        keys.iter()
            .filter_map(|key| {
                let resolved = table.resolve_column(&key.name).map(KeySource::Source).or_else(|| {
                    self.names
                        .iter()
                        .position(|n| names_match(n, &key.name))
                        .map(KeySource::Output)
                });
                if resolved.is_none() {
                    warn!("DISTINCT ON column '{}' not found, ignoring it", key.name);
                }
                resolved
            })
            .collect()
    }
}

/// A WHERE condition bound to column indices of one table.
enum Predicate {
    Or(Box<Predicate>, Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Compare {
        idx: usize,
        op: CompareOp,
        value: String,
    },
    IsNull {
        idx: usize,
        negated: bool,
    },
    Never,
}

impl Predicate {
    fn compile(condition: &Condition, table: &Table) -> Predicate {
        match condition {
            Condition::Or(l, r) => Predicate::Or(
                Box::new(Self::compile(l, table)),
                Box::new(Self::compile(r, table)),
            ),
            Condition::And(l, r) => Predicate::And(
                Box::new(Self::compile(l, table)),
                Box::new(Self::compile(r, table)),
            ),
            Condition::Compare { column, op, value } => match table.resolve_column(&column.name) {
                Some(idx) => Predicate::Compare {
                    idx,
                    op: *op,
                    value: value.clone(),
                },
                None => {
                    warn!("WHERE column '{}' not found, condition is false", column.name);
                    Predicate::Never
                }
            },
            Condition::IsNull { column, negated } => match table.resolve_column(&column.name) {
                Some(idx) => Predicate::IsNull {
                    idx,
                    negated: *negated,
                },
                None => {
                    warn!("WHERE column '{}' not found, condition is false", column.name);
                    Predicate::Never
                }
            },
            Condition::Opaque(text) => {
                warn!("Unsupported WHERE condition '{}', treating as false", text);
                Predicate::Never
            }
        }
    }

    fn eval(&self, row: &[Cell]) -> bool {
        match self {
            Predicate::Or(l, r) => l.eval(row) || r.eval(row),
            Predicate::And(l, r) => l.eval(row) && r.eval(row),
            Predicate::Compare { idx, op, value } => compare(&row[*idx], *op, value),
            Predicate::IsNull { idx, negated } => row[*idx].is_null() != *negated,
            Predicate::Never => false,
        }
    }
}

fn compare(cell: &Cell, op: CompareOp, literal: &str) -> bool {
    let text = cell.as_text();
    let text = text.trim();
    match op {
        CompareOp::Eq => text == literal,
        CompareOp::NotEq => text != literal,
        CompareOp::Like => sql_like_match(text, literal),
        _ => {
            if cell.is_null() {
                return false;
            }
            let ordering = match (text.parse::<f64>(), literal.trim().parse::<f64>()) {
                (Ok(a), Ok(b)) => a.partial_cmp(&b),
                _ => Some(text.cmp(literal.trim())),
            };
            match ordering {
                Some(ord) => match op {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::LtEq => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::GtEq => ord != Ordering::Less,
                    _ => false,
                },
                None => false,
            }
        }
    }
}

/// Case-insensitive LIKE in substring style: `%` matches any run and `_`
/// one character, and the pattern may match anywhere in the text.
pub fn sql_like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let p: Vec<char> = pattern.to_lowercase().chars().collect();

    // reach[j]: pattern[..j] matches a suffix of the text consumed so far
    let mut reach = vec![false; p.len() + 1];
    reach[0] = true;
    for j in 0..p.len() {
        if p[j] != '%' {
            break;
        }
        reach[j + 1] = true;
    }
    if reach[p.len()] {
        return true;
    }

    for &ch in &t {
        let mut next = vec![false; p.len() + 1];
        next[0] = true;
        for j in 0..p.len() {
            next[j + 1] = match p[j] {
                '%' => next[j] || reach[j + 1],
                '_' => reach[j],
                c => reach[j] && c == ch,
            };
        }
        if next[p.len()] {
            return true;
        }
        reach = next;
    }
    false
}
