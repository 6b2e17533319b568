//! Integration tests for schema introspection over an arbitrary connector

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tabula_connectors::{introspect, ColumnInfo, Connector, ConnectorError, Row};

/// Serves fixed tables and counts every call made against it.
struct CountingConnector {
    tables: Vec<String>,
    connected: bool,
    get_tables_calls: AtomicUsize,
    get_columns_calls: AtomicUsize,
    sample_limits: Mutex<Vec<usize>>,
    fail_columns_for: Option<String>,
}

impl CountingConnector {
    fn new(tables: &[&str]) -> Self {
        Self {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            connected: true,
            get_tables_calls: AtomicUsize::new(0),
            get_columns_calls: AtomicUsize::new(0),
            sample_limits: Mutex::new(Vec::new()),
            fail_columns_for: None,
        }
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[async_trait]
impl Connector for CountingConnector {
    fn database_type(&self) -> &'static str {
        "Counting"
    }

    async fn connect(&mut self) -> bool {
        self.connected = true;
        true
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn last_error(&self) -> Option<&ConnectorError> {
        None
    }

    async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        self.get_tables_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.clone())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        self.get_columns_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_columns_for.as_deref() == Some(table) {
            return Err(ConnectorError::query(format!("no such table: {}", table)));
        }
        Ok(vec![ColumnInfo::new("id", "integer", false)])
    }

    async fn get_sample_data(&self, _table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        self.sample_limits.lock().unwrap().push(limit);
        // ignores the limit
        Ok((0..5).map(|i| row(json!({ "id": i }))).collect())
    }

    async fn execute_query(&self, _query: &str, _params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_one_call_per_table() {
    let connector = CountingConnector::new(&["trenches", "finds", "media"]);
    let snapshot = connector.get_schema_info().await.unwrap();

    assert_eq!(connector.get_tables_calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.get_columns_calls.load(Ordering::SeqCst), 3);
    assert_eq!(*connector.sample_limits.lock().unwrap(), vec![3, 3, 3]);

    assert_eq!(snapshot.database_type, "Counting");
    let names: Vec<&String> = snapshot.tables.keys().collect();
    assert_eq!(names, vec!["trenches", "finds", "media"]);
    for table in snapshot.tables.values() {
        assert_eq!(table.sample_data.len(), 3);
        assert_eq!(table.columns, vec![ColumnInfo::new("id", "integer", false)]);
    }
}

#[tokio::test]
async fn test_empty_source() {
    let connector = CountingConnector::new(&[]);
    let snapshot = introspect(&connector).await.unwrap();
    assert!(snapshot.tables.is_empty());
    assert_eq!(connector.get_columns_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_first_failure_aborts() {
    let mut connector = CountingConnector::new(&["trenches", "finds", "media"]);
    connector.fail_columns_for = Some("finds".to_string());
    let err = introspect(&connector).await.unwrap_err();
    assert!(matches!(err, ConnectorError::QueryFailed(_)));
    assert_eq!(connector.get_columns_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_snapshot_through_trait_object() {
    let connector: Box<dyn Connector> = Box::new(CountingConnector::new(&["finds"]));
    let snapshot = connector.get_schema_info().await.unwrap();
    assert_eq!(
        serde_json::to_value(&snapshot).unwrap(),
        json!({
            "database_type": "Counting",
            "tables": {
                "finds": {
                    "columns": [{"name": "id", "type": "integer", "nullable": "NO"}],
                    "sample_data": [{"id": 0}, {"id": 1}, {"id": 2}]
                }
            }
        })
    );
}
