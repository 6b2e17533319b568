//! In-memory table model shared by the flat-file connectors.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::sanitize::RawValue;

/// Strings treated as missing values when typing delimited text.
const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "#N/A", "NULL", "null", "NaN", "nan", "None"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Case-insensitive name comparison, Unicode aware.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Infer a typed cell from a raw text field.
    pub fn infer(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if NULL_MARKERS.contains(&trimmed) {
            return Cell::Null;
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Cell::Int(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Cell::Float(f);
            }
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Cell::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Cell::Bool(false);
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return Cell::DateTime(dt);
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Cell::Date(d);
        }
        Cell::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// String form used by WHERE comparisons and DISTINCT keys.
    ///
    /// Nulls render as the empty string and booleans as `True`/`False`.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Cell::Null => Cow::Borrowed(""),
            Cell::Bool(true) => Cow::Borrowed("True"),
            Cell::Bool(false) => Cow::Borrowed("False"),
            Cell::Int(n) => Cow::Owned(n.to_string()),
            Cell::Float(f) if f.is_finite() && f.fract() == 0.0 => Cow::Owned(format!("{:.1}", f)),
            Cell::Float(f) => Cow::Owned(f.to_string()),
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
            Cell::DateTime(dt) => Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Numeric view of the cell, parsing text when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(n) => Some(*n as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Typed equality against a JSON filter value.
    pub fn matches_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Cell::Null, Value::Null) => true,
            (Cell::Bool(a), Value::Bool(b)) => a == b,
            (Cell::Int(a), Value::Number(b)) => match b.as_i64() {
                Some(b) => *a == b,
                None => b.as_f64() == Some(*a as f64),
            },
            (Cell::Float(a), Value::Number(b)) => b.as_f64() == Some(*a),
            (Cell::Text(a), Value::String(b)) => a == b,
            (Cell::Date(_) | Cell::DateTime(_), Value::String(b)) => {
                self.as_text() == b.as_str() || self.iso_text() == *b
            }
            _ => false,
        }
    }

    fn iso_text(&self) -> String {
        match self {
            Cell::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            other => other.as_text().into_owned(),
        }
    }

    fn type_label(&self) -> Option<&'static str> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some("bool"),
            Cell::Int(_) => Some("int64"),
            Cell::Float(_) => Some("float64"),
            Cell::Text(_) => Some("object"),
            Cell::Date(_) | Cell::DateTime(_) => Some("datetime64[ns]"),
        }
    }

    /// Hand the cell to the sanitizer.
    pub fn to_raw(&self) -> RawValue {
        match self {
            Cell::Null => RawValue::Null,
            Cell::Bool(b) => RawValue::Bool(*b),
            Cell::Int(n) => RawValue::Int(*n),
            Cell::Float(f) => RawValue::Float(*f),
            Cell::Text(s) => RawValue::Text(s.clone()),
            Cell::Date(d) => RawValue::Date(*d),
            Cell::DateTime(dt) => RawValue::DateTime(*dt),
        }
    }
}

/// A named table with ordered columns and rows of cells.
///
/// Every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Null);
        self.rows.push(row);
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Cell>>) -> Self {
        for row in rows {
            self.push_row(row);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a column index, preferring an exact match over a
    /// case-insensitive one.
    pub fn resolve_column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| names_match(c, name)))
    }

    /// Inferred type label per column.
    ///
    /// Integer and float cells together widen to `float64`; any other mix
    /// is `object`. A column of nulls only is `object`.
    pub fn column_types(&self) -> Vec<&'static str> {
        (0..self.columns.len())
            .map(|idx| {
                let mut label: Option<&'static str> = None;
                for row in &self.rows {
                    let Some(cell_label) = row[idx].type_label() else {
                        continue;
                    };
                    label = Some(match label {
                        None => cell_label,
                        Some(current) if current == cell_label => current,
                        Some("int64") | Some("float64")
                            if cell_label == "int64" || cell_label == "float64" =>
                        {
                            "float64"
                        }
                        Some(_) => "object",
                    });
                }
                label.unwrap_or("object")
            })
            .collect()
    }
}
