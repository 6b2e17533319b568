//! Value sanitizer - converts backend-native scalars into JSON-safe values.
//!
//! Every connector decodes driver values into a [`RawValue`] and passes it
//! through [`sanitize`] before a row leaves the connector. The output is
//! always a `serde_json::Value` built from JSON primitives, arrays, objects
//! or one of the placeholder strings below:
//!
//! - binary payloads become `"<binary:N bytes>"`
//! - geometry objects become `"<geometry>"`
//! - values a driver cannot decode become `"<unsupported:TYPE>"`
//!
//! Decimals are converted to the nearest `f64`; precision beyond what an
//! `f64` can carry is lost. NaN and infinite floats become `null`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};

/// A row as returned by every connector: column name to sanitized value,
/// in column order.
pub type Row = serde_json::Map<String, Value>;

/// Placeholder emitted for spatial values.
pub const GEOMETRY_PLACEHOLDER: &str = "<geometry>";

/// A backend-native value before sanitization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Decimal(Decimal),
    Geometry,
    /// Already JSON-shaped data (json/jsonb columns, previously sanitized values).
    Json(Value),
    List(Vec<RawValue>),
    Map(Vec<(String, RawValue)>),
    /// A value the driver could not decode, tagged with its type name.
    Unsupported(String),
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        RawValue::Json(value)
    }
}

/// Convert a raw value into its JSON-safe form. Total and deterministic.
pub fn sanitize(value: RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(n) => Value::Number(n.into()),
        RawValue::UInt(n) => Value::Number(n.into()),
        RawValue::Float(f) => float_value(f),
        RawValue::Text(s) => Value::String(s),
        RawValue::Bytes(b) => Value::String(format!("<binary:{} bytes>", b.len())),
        RawValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        RawValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        RawValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        RawValue::DateTimeTz(dt) => Value::String(dt.to_rfc3339()),
        RawValue::Decimal(d) => d.to_f64().map(float_value).unwrap_or(Value::Null),
        RawValue::Geometry => Value::String(GEOMETRY_PLACEHOLDER.to_string()),
        // serde_json cannot hold NaN, so JSON input is already safe.
        RawValue::Json(v) => v,
        RawValue::List(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        RawValue::Map(fields) => Value::Object(sanitize_row(fields)),
        RawValue::Unsupported(type_name) => {
            Value::String(format!("<unsupported:{}>", type_name.to_lowercase()))
        }
    }
}

/// Sanitize every field of a row, keeping field order.
pub fn sanitize_row<I>(fields: I) -> Row
where
    I: IntoIterator<Item = (String, RawValue)>,
{
    fields
        .into_iter()
        .map(|(name, value)| (name, sanitize(value)))
        .collect()
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
