//! Integration tests for the SQLite connector against a temporary database file

use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tabula_connectors::{
    create_connector, ColumnInfo, ConnectionConfig, Connector, ConnectorError, SqliteConnector,
};

async fn seed_database(path: &std::path::Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in [
        "CREATE TABLE sites (id INTEGER PRIMARY KEY, name TEXT NOT NULL, area REAL)",
        "CREATE TABLE media (id INTEGER PRIMARY KEY, site_id INTEGER, file BLOB, caption TEXT)",
        "INSERT INTO sites (name, area) VALUES ('Corinth', 12.5), ('Isthmia', NULL), ('Nemea', 3.0), ('Argos', 7.25)",
        "INSERT INTO media (site_id, file, caption) VALUES (1, x'FFD8FF', 'north wall')",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

fn config_for(path: &std::path::Path) -> ConnectionConfig {
    ConnectionConfig::new().with("database", path.to_string_lossy().to_string())
}

#[tokio::test]
async fn test_schema_info() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("excavation.db");
    seed_database(&path).await;

    let mut connector = create_connector("sqlite", config_for(&path)).unwrap();
    assert!(connector.connect().await);

    let snapshot = connector.get_schema_info().await.unwrap();
    assert_eq!(snapshot.database_type, "SQLite");
    let names: Vec<&String> = snapshot.tables.keys().collect();
    assert_eq!(names, vec!["media", "sites"]);

    let sites = &snapshot.tables["sites"];
    assert_eq!(
        sites.columns,
        vec![
            ColumnInfo::new("id", "INTEGER", true),
            ColumnInfo::new("name", "TEXT", false),
            ColumnInfo::new("area", "REAL", true),
        ]
    );
    assert_eq!(sites.sample_data.len(), 3);
    assert_eq!(
        Value::Object(sites.sample_data[1].clone()),
        json!({"id": 2, "name": "Isthmia", "area": null})
    );

    let media = &snapshot.tables["media"];
    assert_eq!(media.sample_data[0]["file"], json!("<binary:3 bytes>"));
    connector.disconnect().await;
}

#[tokio::test]
async fn test_parameterized_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("excavation.db");
    seed_database(&path).await;

    let mut connector = SqliteConnector::new(config_for(&path));
    assert!(connector.connect().await);
    let rows = connector
        .execute_query(
            "SELECT name FROM sites WHERE area > ? AND name != ? ORDER BY name",
            &[json!(5), json!("Argos")],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("Corinth"));

    let err = connector.execute_query("SELECT * FROM missing", &[]).await.unwrap_err();
    assert!(matches!(err, ConnectorError::QueryFailed(_)));
    connector.disconnect().await;
}

#[tokio::test]
async fn test_database_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("excavation.db");
    seed_database(&path).await;

    let mut connector = SqliteConnector::new(config_for(&path));
    assert!(connector.connect().await);
    let result = connector
        .execute_query("INSERT INTO sites (name) VALUES ('Delphi')", &[])
        .await;
    assert!(result.is_err());
    connector.disconnect().await;
}
