//! Schema introspection - builds a uniform snapshot from any connector.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConnectorError;
use crate::{Connector, Row};

/// Sample rows collected per table.
pub const SCHEMA_SAMPLE_LIMIT: usize = 3;

/// One column of a table as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    /// `"YES"` or `"NO"`. Inferred backends always report `"YES"`.
    pub nullable: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: if nullable { "YES" } else { "NO" }.to_string(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable.eq_ignore_ascii_case("YES")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,
    pub sample_data: Vec<Row>,
}

/// Tables in discovery order, each with columns and sample rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub database_type: String,
    pub tables: IndexMap<String, TableSchema>,
}

/// Walk every table of a connected connector.
///
/// Issues one `get_tables`, then one `get_columns` and one
/// `get_sample_data(3)` per table. The first failing call aborts the walk.
pub async fn introspect<C>(connector: &C) -> Result<SchemaSnapshot, ConnectorError>
where
    C: Connector + ?Sized,
{
    let names = connector.get_tables().await?;
    debug!(
        "Introspecting {} tables from {}",
        names.len(),
        connector.database_type()
    );

    let mut tables = IndexMap::with_capacity(names.len());
    for name in names {
        let columns = connector.get_columns(&name).await?;
        let mut sample_data = connector.get_sample_data(&name, SCHEMA_SAMPLE_LIMIT).await?;
        sample_data.truncate(SCHEMA_SAMPLE_LIMIT);
        tables.insert(
            name,
            TableSchema {
                columns,
                sample_data,
            },
        );
    }

    Ok(SchemaSnapshot {
        database_type: connector.database_type().to_string(),
        tables,
    })
}
