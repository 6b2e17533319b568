//! Connection configuration - an opaque key/value map each connector reads
//! what it needs from at `connect` time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConnectorError;

/// Seconds a network connector waits for its first connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u16 = 10;

/// Backend-specific connection parameters (host, port, credentials,
/// file path, URI). No generic validation happens here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionConfig(Map<String, Value>);

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object.
    pub fn from_json_str(text: &str) -> Result<Self, ConnectorError> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(ConnectorError::ConfigError(
                "connection config must be a JSON object".to_string(),
            )),
            Err(e) => Err(ConnectorError::ConfigError(format!("invalid config JSON: {}", e))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String value of `key`. Numbers and booleans are rendered as text;
    /// a missing key or `null` yields `None`.
    pub fn get_str(&self, key: &str) -> Result<Option<String>, ConnectorError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(ConnectorError::ConfigError(format!(
                "'{}' must be a string, got {}",
                key, other
            ))),
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String, ConnectorError> {
        Ok(self.get_str(key)?.unwrap_or_else(|| default.to_string()))
    }

    pub fn require_str(&self, key: &str) -> Result<String, ConnectorError> {
        self.get_str(key)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConnectorError::ConfigError(format!("missing required setting '{}'", key)))
    }

    /// Port-like value; accepts a JSON number or a numeric string.
    pub fn get_u16(&self, key: &str) -> Result<Option<u16>, ConnectorError> {
        let invalid = || ConnectorError::ConfigError(format!("'{}' must be a port number", key));
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(Some)
                .ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse::<u16>().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    pub fn u16_or(&self, key: &str, default: u16) -> Result<u16, ConnectorError> {
        Ok(self.get_u16(key)?.unwrap_or(default))
    }

    /// `connect_timeout` in seconds.
    pub fn connect_timeout(&self) -> Result<Duration, ConnectorError> {
        let secs = self.u16_or("connect_timeout", DEFAULT_CONNECT_TIMEOUT_SECS)?;
        Ok(Duration::from_secs(secs.into()))
    }
}

impl From<Map<String, Value>> for ConnectionConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_str() {
        let config = ConnectionConfig::from_json_str(r#"{"host": "db", "port": 5433}"#).unwrap();
        assert_eq!(config.get_str("host").unwrap(), Some("db".to_string()));
        assert_eq!(config.get_u16("port").unwrap(), Some(5433));
    }

    #[test]
    fn test_from_json_str_rejects_non_object() {
        assert!(matches!(
            ConnectionConfig::from_json_str("[1, 2]"),
            Err(ConnectorError::ConfigError(_))
        ));
        assert!(ConnectionConfig::from_json_str("{").is_err());
    }

    #[test]
    fn test_port_accepts_numeric_string() {
        let config = ConnectionConfig::new().with("port", "3307");
        assert_eq!(config.u16_or("port", 3306).unwrap(), 3307);
    }

    #[test]
    fn test_port_rejects_out_of_range() {
        let config = ConnectionConfig::new().with("port", 70000);
        assert!(config.get_u16("port").is_err());
        let config = ConnectionConfig::new().with("port", "abc");
        assert!(config.get_u16("port").is_err());
    }

    #[test]
    fn test_defaults_and_required() {
        let config = ConnectionConfig::new().with("database", "").with("user", json!(null));
        assert_eq!(config.str_or("host", "localhost").unwrap(), "localhost");
        assert_eq!(config.get_str("user").unwrap(), None);
        assert!(config.require_str("database").is_err());
        assert!(config.require_str("file_path").is_err());
    }

    #[test]
    fn test_connect_timeout() {
        assert_eq!(
            ConnectionConfig::new().connect_timeout().unwrap(),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS.into())
        );
        let config = ConnectionConfig::new().with("connect_timeout", 2);
        assert_eq!(config.connect_timeout().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_nested_value_is_not_a_string() {
        let config = ConnectionConfig::new().with("host", json!({"a": 1}));
        assert!(config.get_str("host").is_err());
    }
}
