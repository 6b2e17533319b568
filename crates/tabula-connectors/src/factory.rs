//! Connector factory: pluggable backend registration by identifier.

use std::sync::Arc;

use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ConnectorError;
use crate::{
    Connector, CsvConnector, ExcelConnector, MongoConnector, MySqlConnector, PostgresConnector,
    SqliteConnector,
};

/// Builds connectors for one backend.
pub trait ConnectorFactory: Send + Sync {
    /// Canonical backend identifier, e.g. `postgresql`.
    fn backend_id(&self) -> &'static str;

    /// Alternative identifiers accepted for this backend.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Returns `true` if this factory answers to `backend` (case-insensitive).
    fn can_handle(&self, backend: &str) -> bool {
        let backend = backend.trim();
        backend.eq_ignore_ascii_case(self.backend_id())
            || self.aliases().iter().any(|a| backend.eq_ignore_ascii_case(a))
    }

    /// Build an unconnected connector for `config`.
    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector>;
}

/// Registry of connector factories. Iterates factories in order and delegates
/// to the first one that can handle a backend identifier.
pub struct ConnectorRegistry {
    factories: Vec<Arc<dyn ConnectorFactory>>,
}

impl ConnectorRegistry {
    pub fn new(factories: Vec<Arc<dyn ConnectorFactory>>) -> Self {
        Self { factories }
    }

    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) {
        self.factories.push(factory);
    }

    /// Build a connector for `backend`. No connection is opened.
    pub fn create(
        &self,
        backend: &str,
        config: ConnectionConfig,
    ) -> Result<Box<dyn Connector>, ConnectorError> {
        for factory in &self.factories {
            if factory.can_handle(backend) {
                debug!("Creating {} connector", factory.backend_id());
                return Ok(factory.create(config));
            }
        }
        Err(ConnectorError::UnsupportedBackend(backend.to_string()))
    }

    /// Canonical identifiers of every registered backend.
    pub fn supported_backends(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.backend_id()).collect()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        default_registry()
    }
}

// ---------------------------------------------------------------------------
// Built-in factory implementations
// ---------------------------------------------------------------------------

pub struct PostgresFactory;

impl ConnectorFactory for PostgresFactory {
    fn backend_id(&self) -> &'static str {
        "postgresql"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["postgres"]
    }

    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
        Box::new(PostgresConnector::new(config))
    }
}

pub struct MySqlFactory;

impl ConnectorFactory for MySqlFactory {
    fn backend_id(&self) -> &'static str {
        "mysql"
    }

    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
        Box::new(MySqlConnector::new(config))
    }
}

pub struct SqliteFactory;

impl ConnectorFactory for SqliteFactory {
    fn backend_id(&self) -> &'static str {
        "sqlite"
    }

    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
        Box::new(SqliteConnector::new(config))
    }
}

pub struct MongoFactory;

impl ConnectorFactory for MongoFactory {
    fn backend_id(&self) -> &'static str {
        "mongodb"
    }

    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
        Box::new(MongoConnector::new(config))
    }
}

pub struct ExcelFactory;

impl ConnectorFactory for ExcelFactory {
    fn backend_id(&self) -> &'static str {
        "excel"
    }

    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
        Box::new(ExcelConnector::new(config))
    }
}

pub struct CsvFactory;

impl ConnectorFactory for CsvFactory {
    fn backend_id(&self) -> &'static str {
        "csv"
    }

    fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
        Box::new(CsvConnector::new(config))
    }
}

/// Registry with every built-in backend.
pub fn default_registry() -> ConnectorRegistry {
    ConnectorRegistry::new(vec![
        Arc::new(PostgresFactory),
        Arc::new(MySqlFactory),
        Arc::new(SqliteFactory),
        Arc::new(MongoFactory),
        Arc::new(ExcelFactory),
        Arc::new(CsvFactory),
    ])
}

/// Build a connector for `backend` from the default registry.
pub fn create_connector(
    backend: &str,
    config: ConnectionConfig,
) -> Result<Box<dyn Connector>, ConnectorError> {
    default_registry().create(backend, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_ids_resolve() {
        let cases = [
            ("postgresql", "PostgreSQL"),
            ("postgres", "PostgreSQL"),
            ("MySQL", "MySQL"),
            ("sqlite", "SQLite"),
            ("mongodb", "MongoDB"),
            ("Excel", "Excel"),
            ("csv", "CSV"),
        ];
        for (backend, label) in cases {
            let connector = create_connector(backend, ConnectionConfig::new()).unwrap();
            assert_eq!(connector.database_type(), label, "backend {}", backend);
            assert!(!connector.is_connected());
        }
    }

    #[test]
    fn test_unknown_backend() {
        let err = create_connector("oracle", ConnectionConfig::new()).err().unwrap();
        assert_eq!(err, ConnectorError::UnsupportedBackend("oracle".into()));
        assert_eq!(err.to_string(), "unsupported backend: oracle");
    }

    #[test]
    fn test_supported_backends() {
        assert_eq!(
            default_registry().supported_backends(),
            vec!["postgresql", "mysql", "sqlite", "mongodb", "excel", "csv"]
        );
    }

    #[test]
    fn test_custom_factory_registration() {
        struct ParquetFactory;
        impl ConnectorFactory for ParquetFactory {
            fn backend_id(&self) -> &'static str {
                "parquet"
            }
            fn create(&self, config: ConnectionConfig) -> Box<dyn Connector> {
                Box::new(CsvConnector::new(config))
            }
        }

        let mut registry = default_registry();
        assert!(registry.create("parquet", ConnectionConfig::new()).is_err());
        registry.register(Arc::new(ParquetFactory));
        assert!(registry.create("parquet", ConnectionConfig::new()).is_ok());
    }
}
