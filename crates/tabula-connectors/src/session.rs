//! Connection probe and scoped sessions.

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::factory::ConnectorRegistry;
use crate::Connector;

/// Outcome of [`test_connection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub tables: Vec<String>,
    pub message: String,
}

impl ConnectionTestResult {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            tables: Vec::new(),
            message,
        }
    }
}

/// Connect, list tables and disconnect. Never fails; the outcome is
/// reported in the result.
pub async fn test_connection(
    registry: &ConnectorRegistry,
    backend: &str,
    config: ConnectionConfig,
) -> ConnectionTestResult {
    let mut connector = match registry.create(backend, config) {
        Ok(connector) => connector,
        Err(e) => return ConnectionTestResult::failed(e.to_string()),
    };

    if !connector.connect().await {
        let reason = connector
            .last_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        connector.disconnect().await;
        return ConnectionTestResult::failed(format!("Connection failed: {}", reason));
    }

    let result = match connector.get_tables().await {
        Ok(tables) => ConnectionTestResult {
            success: true,
            message: format!("Connected successfully. Found {} tables.", tables.len()),
            tables,
        },
        Err(e) => {
            warn!("Listing tables failed after connect: {}", e);
            ConnectionTestResult::failed(format!("Connection failed: {}", e))
        }
    };
    connector.disconnect().await;
    info!("Connection test for {}: {}", backend, result.message);
    result
}

/// Create a connector, connect, run `f` and disconnect, on every exit path.
///
/// ```ignore
/// let tables = with_connection(&registry, "sqlite", config, |c| {
///     Box::pin(async move { c.get_tables().await })
/// })
/// .await?;
/// ```
pub async fn with_connection<T, F>(
    registry: &ConnectorRegistry,
    backend: &str,
    config: ConnectionConfig,
    f: F,
) -> Result<T, ConnectorError>
where
    F: for<'c> FnOnce(&'c mut dyn Connector) -> BoxFuture<'c, Result<T, ConnectorError>>,
{
    let mut connector = registry.create(backend, config)?;
    if !connector.connect().await {
        let err = connector
            .last_error()
            .cloned()
            .unwrap_or_else(|| ConnectorError::connection("connect failed"));
        connector.disconnect().await;
        return Err(err);
    }

    let result = f(connector.as_mut()).await;
    connector.disconnect().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::default_registry;

    #[tokio::test]
    async fn test_unknown_backend_probe() {
        let result = test_connection(&default_registry(), "oracle", ConnectionConfig::new()).await;
        assert!(!result.success);
        assert!(result.tables.is_empty());
        assert_eq!(result.message, "unsupported backend: oracle");
    }

    #[tokio::test]
    async fn test_failed_connect_probe() {
        let config = ConnectionConfig::new().with("file_path", "/nonexistent/finds.csv");
        let result = test_connection(&default_registry(), "csv", config).await;
        assert!(!result.success);
        assert!(result.message.starts_with("Connection failed: connection failed:"));
    }

    #[tokio::test]
    async fn test_in_memory_probe() {
        let config = ConnectionConfig::new().with("database", ":memory:");
        let result = test_connection(&default_registry(), "sqlite", config).await;
        assert!(result.success);
        assert_eq!(result.message, "Connected successfully. Found 0 tables.");
    }

    #[tokio::test]
    async fn test_with_connection_returns_connect_error() {
        let config = ConnectionConfig::new().with("file_path", "/nonexistent/finds.xlsx");
        let result = with_connection(&default_registry(), "excel", config, |c| {
            Box::pin(async move { c.get_tables().await })
        })
        .await;
        assert!(matches!(result, Err(ConnectorError::ConnectionFailed(_))));
    }
}
