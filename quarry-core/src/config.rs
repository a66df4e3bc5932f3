//! Connection configuration

use crate::connection::{Connection, Driver};
use crate::grammar::{Dialect, Grammar};
use crate::processor::Processor;
use crate::Result;
use serde::{Deserialize, Serialize};

fn default_name() -> String {
    "default".to_string()
}

/// Settings for one named connection.
///
/// ```json
/// {
///     "name": "main",
///     "driver": "pgsql",
///     "url": "postgres://localhost/app",
///     "read": { "url": "postgres://replica/app" },
///     "prefix": "app_",
///     "sticky": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub driver: Dialect,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<ReadConfig>,
    /// Table prefix
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub sticky: bool,
    /// Override whether nested transactions use savepoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savepoints: Option<bool>,
    /// Start with the query log enabled
    #[serde(default)]
    pub logging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadConfig {
    pub url: String,
}

impl ConnectionConfig {
    pub fn new(driver: Dialect, url: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            driver,
            url: url.into(),
            read: None,
            prefix: String::new(),
            sticky: false,
            savepoints: None,
            logging: false,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn grammar(&self) -> Grammar {
        let grammar = Grammar::new(self.driver).with_table_prefix(self.prefix.clone());
        match self.savepoints {
            Some(enabled) => grammar.with_savepoints(enabled),
            None => grammar,
        }
    }

    pub fn processor(&self) -> Processor {
        Processor::new(self.driver)
    }
}

impl<D: Driver> Connection<D> {
    /// Wire a connection from configuration and already opened handles
    pub fn from_config(config: &ConnectionConfig, write: D, read: Option<D>) -> Self {
        let mut connection = Connection::new(write, config.grammar())
            .with_name(config.name.clone())
            .with_processor(config.processor())
            .with_sticky(config.sticky);
        connection.set_read_driver(read);
        if config.logging {
            connection.enable_query_log();
        }
        connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockDriver;
    use crate::Error;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_from_json_defaults() {
        let config = assert_ok!(ConnectionConfig::from_json(r#"{"driver": "postgresql", "url": "postgres://localhost/app"}"#));
        assert_eq!(config.name, "default");
        assert_eq!(config.driver, Dialect::Postgres);
        assert_eq!(config.read, None);
        assert!(!config.sticky);
        assert!(config.grammar().supports_savepoints());
    }

    #[test]
    fn test_full_config() {
        let config = assert_ok!(ConnectionConfig::from_json(
            r#"{
                "name": "main",
                "driver": "mariadb",
                "url": "mysql://localhost/app",
                "read": {"url": "mysql://replica/app"},
                "prefix": "app_",
                "sticky": true,
                "savepoints": false,
                "logging": true
            }"#
        ));
        assert_eq!(config.driver, Dialect::MySql);
        assert_eq!(config.read.as_ref().map(|read| read.url.as_str()), Some("mysql://replica/app"));

        let grammar = config.grammar();
        assert_eq!(grammar.table_prefix(), "app_");
        assert!(!grammar.supports_savepoints());

        let connection = Connection::from_config(&config, MockDriver::new("write"), Some(MockDriver::new("read")));
        assert_eq!(connection.name(), "main");
        assert!(connection.logging());
        assert!(connection.read_driver().is_some());
        assert_eq!(
            assert_ok!(connection.table("users").to_sql()),
            "select * from `app_users`"
        );
    }

    #[test]
    fn test_unknown_driver() {
        let error = assert_err!(ConnectionConfig::from_json(r#"{"driver": "oracle"}"#));
        assert!(matches!(error, Error::Serialization(_)));
    }
}
