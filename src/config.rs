//! Adapter configuration.
//!
//! Names the database and table an [`AsyncStorage`](crate::AsyncStorage)
//! binds to. Loadable from JSON so embedding applications can keep it next to
//! their other settings.

use crate::error::{Error, Result};
use crate::storage::{DEFAULT_DB_NAME, DEFAULT_TABLE_NAME};
use serde::{Deserialize, Serialize};

/// Database and table names for one adapter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Name of the database to open.
    pub database_name: String,
    /// Name of the table inside the database.
    pub table_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DB_NAME.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl StorageConfig {
    /// Creates a configuration with explicit names.
    pub fn new(database_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            table_name: table_name.into(),
        }
    }

    /// Parses and validates a JSON configuration. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed, has unknown fields,
    /// or fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates all configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.database_name.is_empty() {
            return Err(Error::Config {
                message: "database_name must not be empty".to_string(),
            });
        }
        if self.table_name.is_empty() {
            return Err(Error::Config {
                message: "table_name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.database_name, "asyncStorageDB");
        assert_eq!(config.table_name, "store");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = StorageConfig::from_json(r#"{"table_name": "sessions"}"#).unwrap();
        assert_eq!(config.database_name, DEFAULT_DB_NAME);
        assert_eq!(config.table_name, "sessions");
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let err = StorageConfig::from_json(r#"{"db": "x"}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let err = StorageConfig::new("", "store").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: database_name must not be empty"
        );
        assert!(StorageConfig::from_json(r#"{"table_name": ""}"#).is_err());
    }
}
