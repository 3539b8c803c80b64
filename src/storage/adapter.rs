//! The storage adapter.
//!
//! [`AsyncStorage`] turns any [`HostStore`] into a four-method key-value
//! contract. The connection opens on first use and is cached for the life of
//! the instance; every operation then runs as one request in its own
//! transaction.

use crate::config::StorageConfig;
use crate::error::{HostError, StorageError};
use crate::storage::schema::{Schema, ensure_table};
use crate::storage::traits::{
    HostConnection, HostStore, HostTransaction, Operation, Request, Upgrade,
};
use crate::storage::{DEFAULT_DB_NAME, DEFAULT_TABLE_NAME, SCHEMA_VERSION};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

/// Asynchronous key-value storage over a host store.
///
/// Construction performs no I/O. The first operation opens the database at
/// [`SCHEMA_VERSION`], creating the table if needed. Callers that race the
/// first open wait on the same in-flight open. A failed open caches nothing,
/// so the next operation tries again.
///
/// # Examples
///
/// ```
/// use async_storage::{AsyncStorage, MemoryHost};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), async_storage::StorageError> {
/// let storage = AsyncStorage::new(MemoryHost::new());
/// storage.set_item("testKey", "testValue").await?;
/// let value: Option<String> = storage.get_item("testKey").await?;
/// assert_eq!(value.as_deref(), Some("testValue"));
/// # Ok(())
/// # }
/// ```
pub struct AsyncStorage<H: HostStore> {
    host: H,
    database_name: String,
    table_name: String,
    connection: OnceCell<H::Connection>,
}

impl<H: HostStore> AsyncStorage<H> {
    /// Creates an adapter over `host` using the default database and table
    /// names.
    pub fn new(host: H) -> Self {
        Self::with_names(host, DEFAULT_DB_NAME, DEFAULT_TABLE_NAME)
    }

    /// Creates an adapter over `host` bound to `database_name`/`table_name`.
    pub fn with_names(
        host: H,
        database_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            host,
            database_name: database_name.into(),
            table_name: table_name.into(),
            connection: OnceCell::new(),
        }
    }

    /// Creates an adapter over `host` using the names in `config`.
    pub fn from_config(host: H, config: &StorageConfig) -> Self {
        Self::with_names(host, &config.database_name, &config.table_name)
    }

    /// Returns the database name.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the underlying host store.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Returns `true` once a connection has been opened and cached.
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Stores `value` under `key`, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `value` cannot be
    /// serialized, or the host's failure to open the database or commit the
    /// write.
    pub async fn set_item<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.run(Request::Put {
            key: key.to_string(),
            value,
        })
        .await?;
        Ok(())
    }

    /// Returns the value stored under `key`, or `None` if the key is absent.
    ///
    /// A stored JSON `null` read as [`Value`] is `Some(Value::Null)`; only a
    /// missing key yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored value does not
    /// deserialize into `T`, or the host's failure to open the database or
    /// execute the read.
    pub async fn get_item<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned,
    {
        let stored = self
            .run(Request::Get {
                key: key.to_string(),
            })
            .await?;
        stored
            .map(|value| {
                serde_json::from_value(value).map_err(|source| StorageError::Serialization {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Deletes `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns the host's failure to open the database or execute the delete.
    pub async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.run(Request::Delete {
            key: key.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Deletes every entry in the table.
    ///
    /// # Errors
    ///
    /// Returns the host's failure to open the database or execute the clear.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.run(Request::Clear).await?;
        Ok(())
    }

    /// Returns the cached connection, opening it first if needed.
    async fn ensure_connection(&self) -> Result<&H::Connection, StorageError> {
        self.connection.get_or_try_init(|| self.open()).await
    }

    async fn open(&self) -> Result<H::Connection, StorageError> {
        let table = self.table_name.clone();
        let upgrade: Upgrade = Arc::new(move |current: &Schema| ensure_table(current, &table));

        debug!(database = %self.database_name, version = SCHEMA_VERSION, "opening database");
        match self
            .host
            .open(&self.database_name, SCHEMA_VERSION, upgrade)
            .await
        {
            Ok(connection) => {
                debug!(database = %self.database_name, "database ready");
                Ok(connection)
            }
            Err(source) => {
                warn!(database = %self.database_name, error = %source, "failed to open database");
                Err(StorageError::Open {
                    database: self.database_name.clone(),
                    source,
                })
            }
        }
    }

    /// Runs `request` in a fresh transaction on the table.
    async fn run(&self, request: Request) -> Result<Option<Value>, StorageError> {
        let operation = request.operation();
        let connection = self.ensure_connection().await?;
        trace!(table = %self.table_name, %operation, "issuing request");

        let transaction = connection
            .transaction(&self.table_name, operation.mode())
            .map_err(|source| self.request_error(operation, source))?;
        transaction
            .execute(request)
            .await
            .map_err(|source| self.request_error(operation, source))
    }

    fn request_error(&self, operation: Operation, source: HostError) -> StorageError {
        warn!(table = %self.table_name, %operation, error = %source, "request failed");
        StorageError::Request {
            operation,
            table: self.table_name.clone(),
            source,
        }
    }
}

impl<H: HostStore> fmt::Debug for AsyncStorage<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStorage")
            .field("database_name", &self.database_name)
            .field("table_name", &self.table_name)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostErrorKind;
    use crate::storage::memory::MemoryHost;
    use serde_json::json;

    #[tokio::test]
    async fn test_construction_performs_no_io() {
        let host = MemoryHost::new();
        let storage = AsyncStorage::new(host.clone());
        assert_eq!(host.open_count(), 0);
        assert!(!storage.is_connected());
        assert_eq!(storage.database_name(), DEFAULT_DB_NAME);
        assert_eq!(storage.table_name(), DEFAULT_TABLE_NAME);
    }

    #[tokio::test]
    async fn test_connection_reused() {
        let host = MemoryHost::new();
        let storage = AsyncStorage::new(host.clone());
        storage.set_item("a", &1).await.unwrap();
        storage.get_item::<i32>("a").await.unwrap();
        storage.remove_item("a").await.unwrap();
        storage.clear().await.unwrap();

        assert!(storage.is_connected());
        assert_eq!(host.open_count(), 1);
        assert_eq!(host.upgrade_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_open_once() {
        let host = MemoryHost::new();
        let storage = AsyncStorage::new(host.clone());
        let (a, b, c) = tokio::join!(
            storage.set_item("a", "1"),
            storage.get_item::<String>("b"),
            storage.clear(),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        assert_eq!(host.open_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_cached() {
        let host = MemoryHost::new();
        let storage = AsyncStorage::new(host.clone());
        host.fail_next_open(HostError::unknown("quota exceeded"));

        let err = storage.get_item::<String>("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Open { .. }));
        assert!(!storage.is_connected());

        assert_eq!(storage.get_item::<String>("k").await.unwrap(), None);
        assert_eq!(host.open_count(), 2);
    }

    #[tokio::test]
    async fn test_stored_null_is_not_absent() {
        let storage = AsyncStorage::new(MemoryHost::new());
        storage.set_item("nothing", &Value::Null).await.unwrap();
        assert_eq!(
            storage.get_item::<Value>("nothing").await.unwrap(),
            Some(Value::Null)
        );
        assert_eq!(storage.get_item::<Value>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_serialization_error() {
        let storage = AsyncStorage::new(MemoryHost::new());
        storage.set_item("n", &json!({"a": 1})).await.unwrap();
        let err = storage.get_item::<u64>("n").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { ref key, .. } if key == "n"));
    }

    #[tokio::test]
    async fn test_newer_stored_version_fails_open() {
        let host = MemoryHost::new();
        let upgrade: Upgrade = Arc::new(|current: &Schema| current.clone());
        host.open(DEFAULT_DB_NAME, SCHEMA_VERSION + 1, upgrade)
            .await
            .unwrap();

        let storage = AsyncStorage::new(host);
        let err = storage.clear().await.unwrap_err();
        assert_eq!(
            err.host_error().map(HostError::kind),
            Some(HostErrorKind::Version)
        );
    }

    #[tokio::test]
    async fn test_names_from_config() {
        let host = MemoryHost::new();
        let config = StorageConfig::new("app", "prefs");
        let storage = AsyncStorage::from_config(host.clone(), &config);
        storage.set_item("theme", "dark").await.unwrap();

        let schema = host.schema("app").unwrap();
        assert!(schema.has_table("prefs"));
        assert!(format!("{storage:?}").contains("prefs"));
    }

    #[tokio::test]
    async fn test_second_table_needs_new_version() {
        let host = MemoryHost::new();
        let first = AsyncStorage::with_names(host.clone(), "db", "one");
        first.set_item("k", "v").await.unwrap();

        // Same database at the same version: no upgrade, so the table is missing.
        let second = AsyncStorage::with_names(host, "db", "two");
        let err = second.set_item("k", "v").await.unwrap_err();
        assert_eq!(
            err.host_error().map(HostError::kind),
            Some(HostErrorKind::NotFound)
        );
    }
}
