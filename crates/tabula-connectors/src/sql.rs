//! Helpers shared by the sqlx-backed connectors: identifier quoting,
//! positional JSON parameter binding and per-value decoding.

use sqlx::query::Query;
use sqlx::{ColumnIndex, Database, Decode, Encode, Type};
use serde_json::Value;
use tabula_core::RawValue;
use tracing::debug;

/// Quote an identifier with `quote`, doubling embedded quote characters.
pub fn quote_ident(name: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{q}{}{q}", name.replace(quote, &doubled), q = quote)
}

/// Bind JSON values positionally. Arrays and objects are bound as JSON text.
pub fn bind_json_params<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &[Value],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Decode column `idx` as `T`, or tag the value as unsupported.
pub fn decode_as<'r, R, T>(
    row: &'r R,
    idx: usize,
    type_name: &str,
    wrap: impl FnOnce(T) -> RawValue,
) -> RawValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<T, _>(idx) {
        Ok(value) => wrap(value),
        Err(e) => {
            debug!("Cannot decode column {} of type {}: {}", idx, type_name, e);
            RawValue::Unsupported(type_name.to_string())
        }
    }
}

/// Whether a backend type name denotes a spatial value.
pub fn is_spatial_type(type_name: &str) -> bool {
    let upper = type_name.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "GEOMETRY"
            | "GEOGRAPHY"
            | "POINT"
            | "LINESTRING"
            | "POLYGON"
            | "MULTIPOINT"
            | "MULTILINESTRING"
            | "MULTIPOLYGON"
            | "GEOMETRYCOLLECTION"
            | "BOX2D"
            | "BOX3D"
    )
}
