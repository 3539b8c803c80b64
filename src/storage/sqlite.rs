//! `SQLite` host store.
//!
//! Provides durable storage using `SQLite`. Each database name maps to one
//! `SQLite` database; each logical table maps to one entry table holding JSON
//! text. Blocking `SQLite` calls run on tokio's blocking pool and settle a
//! [`completion`] signal, so a waiting caller sees its future settle once.

use crate::error::HostError;
use crate::storage::completion;
use crate::storage::schema::{
    GET_VERSION_SQL, LIST_TABLES_SQL, META_SCHEMA_SQL, REGISTER_TABLE_SQL, SET_VERSION_SQL,
    Schema, UNREGISTER_TABLE_SQL, create_entry_table_sql, drop_entry_table_sql, entry_table_ident,
};
use crate::storage::traits::{
    HostConnection, HostStore, HostTransaction, Request, TransactionMode, Upgrade,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File extension used for database files.
pub const DB_FILE_EXTENSION: &str = "sqlite3";

type SharedConnection = Arc<Mutex<Connection>>;

/// Returns the file name for database `name`.
///
/// Bytes outside `[A-Za-z0-9_-]` are percent-encoded, so every name maps to
/// its own file directly inside the host directory.
fn database_file_name(name: &str) -> String {
    let mut file = String::with_capacity(name.len() + DB_FILE_EXTENSION.len() + 1);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            file.push(char::from(byte));
        } else {
            let _ = write!(file, "%{byte:02X}");
        }
    }
    file.push('.');
    file.push_str(DB_FILE_EXTENSION);
    file
}

#[derive(Debug)]
enum Location {
    Directory(PathBuf),
    Memory(Mutex<HashMap<String, SharedConnection>>),
}

/// SQLite-backed host store.
///
/// # Examples
///
/// ```no_run
/// use async_storage::{AsyncStorage, SqliteHost};
///
/// # async fn demo() -> Result<(), async_storage::StorageError> {
/// let storage = AsyncStorage::new(SqliteHost::open_dir(".state"));
/// storage.set_item("greeting", "hello").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteHost {
    location: Arc<Location>,
}

impl SqliteHost {
    /// Creates a host storing database `name` at `dir/<name>.sqlite3`, with
    /// `name` percent-encoded.
    ///
    /// Performs no I/O; `dir` is created on the first open.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            location: Arc::new(Location::Directory(dir.as_ref().to_path_buf())),
        }
    }

    /// Creates a host keeping its databases in memory.
    ///
    /// Each database name gets one connection that lives as long as the host,
    /// so reopening a name sees the data written earlier.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            location: Arc::new(Location::Memory(Mutex::new(HashMap::new()))),
        }
    }

    /// Returns the file path database `name` is stored at (None for in-memory).
    #[must_use]
    pub fn database_path(&self, name: &str) -> Option<PathBuf> {
        match self.location.as_ref() {
            Location::Directory(dir) => Some(dir.join(database_file_name(name))),
            Location::Memory(_) => None,
        }
    }

    fn connect(&self, name: &str) -> Result<SharedConnection, HostError> {
        match self.location.as_ref() {
            Location::Directory(dir) => {
                if !dir.exists() {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        HostError::unknown(format!("failed to create {}: {e}", dir.display()))
                    })?;
                }
                let path = dir.join(database_file_name(name));
                let conn = Connection::open(&path)?;

                // Use WAL mode for better concurrent access (returns result, use query_row)
                let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;

                Ok(Arc::new(Mutex::new(conn)))
            }
            Location::Memory(connections) => {
                let mut connections = connections.lock();
                if let Some(conn) = connections.get(name) {
                    return Ok(Arc::clone(conn));
                }
                let conn = Arc::new(Mutex::new(Connection::open_in_memory()?));
                connections.insert(name.to_string(), Arc::clone(&conn));
                Ok(conn)
            }
        }
    }
}

/// Reads the stored schema.
fn read_schema(conn: &Connection) -> Result<Schema, HostError> {
    let version: Option<String> = conn
        .query_row(GET_VERSION_SQL, [], |row| row.get(0))
        .optional()?;
    let version: u32 = match version {
        Some(v) => v
            .parse()
            .map_err(|_| HostError::data(format!("stored schema version `{v}` is not a number")))?,
        None => 0,
    };

    let mut stmt = conn.prepare(LIST_TABLES_SQL)?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(Schema { version, tables })
}

/// Brings the database to `version`, applying `upgrade` when it is behind.
fn open_database(
    conn: &mut Connection,
    name: &str,
    version: u32,
    upgrade: &Upgrade,
) -> Result<Schema, HostError> {
    if version == 0 {
        return Err(HostError::version("version must be at least 1"));
    }

    let tx = conn.transaction()?;
    tx.execute_batch(META_SCHEMA_SQL)?;
    let current = read_schema(&tx)?;

    if current.version > version {
        return Err(HostError::version(format!(
            "requested version {version} is less than stored version {}",
            current.version
        )));
    }
    if current.version == version {
        tx.commit()?;
        return Ok(current);
    }

    let target = upgrade(&current);
    for table in target.tables.difference(&current.tables) {
        tx.execute_batch(&create_entry_table_sql(table))?;
        tx.execute(REGISTER_TABLE_SQL, params![table])?;
    }
    for table in current.tables.difference(&target.tables) {
        tx.execute_batch(&drop_entry_table_sql(table))?;
        tx.execute(UNREGISTER_TABLE_SQL, params![table])?;
    }
    tx.execute(SET_VERSION_SQL, params![version.to_string()])?;
    tx.commit()?;

    debug!(database = %name, from = current.version, to = version, "applied schema upgrade");
    Ok(Schema {
        version,
        tables: target.tables,
    })
}

#[async_trait]
impl HostStore for SqliteHost {
    type Connection = SqliteConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: Upgrade,
    ) -> Result<Self::Connection, HostError> {
        let host = self.clone();
        let database = name.to_string();
        let (signal, completion) = completion::channel();
        tokio::task::spawn_blocking(move || {
            signal.settle(open_blocking(&host, database, version, &upgrade));
        });
        completion.await
    }
}

fn open_blocking(
    host: &SqliteHost,
    database: String,
    version: u32,
    upgrade: &Upgrade,
) -> Result<SqliteConnection, HostError> {
    let conn = host.connect(&database)?;
    let schema = open_database(&mut conn.lock(), &database, version, upgrade)?;
    Ok(SqliteConnection {
        conn,
        tables: Arc::new(schema.tables),
        database,
    })
}

/// Connection to one `SQLite` database.
///
/// The table set is fixed when the connection opens.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    conn: SharedConnection,
    tables: Arc<BTreeSet<String>>,
    database: String,
}

impl HostConnection for SqliteConnection {
    type Transaction = SqliteTransaction;

    fn transaction(
        &self,
        table: &str,
        mode: TransactionMode,
    ) -> Result<Self::Transaction, HostError> {
        if !self.tables.contains(table) {
            return Err(HostError::not_found(format!(
                "table `{table}` does not exist in database `{}`",
                self.database
            )));
        }
        Ok(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            table: table.to_string(),
            mode,
        })
    }
}

/// Transaction scoping one request against a `SQLite` entry table.
#[derive(Debug)]
pub struct SqliteTransaction {
    conn: SharedConnection,
    table: String,
    mode: TransactionMode,
}

/// Runs one request in `SQLite` autocommit mode; each statement is atomic.
fn execute_request(
    conn: &Connection,
    table: &str,
    request: Request,
) -> Result<Option<Value>, HostError> {
    let ident = entry_table_ident(table);
    match request {
        Request::Put { key, value } => {
            let data = serde_json::to_string(&value).map_err(|e| HostError::data(e.to_string()))?;
            conn.execute(
                &format!(
                    "INSERT INTO {ident} (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                ),
                params![key, data],
            )?;
            Ok(None)
        }
        Request::Get { key } => {
            let data: Option<String> = conn
                .query_row(
                    &format!("SELECT value FROM {ident} WHERE key = ?1"),
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(|json| serde_json::from_str(&json).map_err(|e| HostError::data(e.to_string())))
                .transpose()
        }
        Request::Delete { key } => {
            conn.execute(&format!("DELETE FROM {ident} WHERE key = ?1"), params![key])?;
            Ok(None)
        }
        Request::Clear => {
            conn.execute(&format!("DELETE FROM {ident}"), [])?;
            Ok(None)
        }
    }
}

#[async_trait]
impl HostTransaction for SqliteTransaction {
    async fn execute(self, request: Request) -> Result<Option<Value>, HostError> {
        request.check_mode(self.mode)?;
        let Self { conn, table, .. } = self;
        let (signal, completion) = completion::channel();
        tokio::task::spawn_blocking(move || {
            signal.settle(execute_request(&conn.lock(), &table, request));
        });
        completion.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostErrorKind;
    use crate::storage::schema::ensure_table;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_upgrade() -> Upgrade {
        Arc::new(|current: &Schema| ensure_table(current, "store"))
    }

    #[tokio::test]
    async fn test_open_creates_file_and_table() {
        let temp = TempDir::new().unwrap();
        let host = SqliteHost::open_dir(temp.path().join("nested"));
        let conn = host.open("db", 1, store_upgrade()).await.unwrap();

        assert!(host.database_path("db").unwrap().exists());
        assert!(conn.transaction("store", TransactionMode::ReadOnly).is_ok());
    }

    #[tokio::test]
    async fn test_upgrade_not_rerun_at_same_version() {
        let host = SqliteHost::in_memory();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let upgrade: Upgrade = Arc::new(move |current: &Schema| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            ensure_table(current, "store")
        });

        host.open("db", 1, Arc::clone(&upgrade)).await.unwrap();
        host.open("db", 1, upgrade).await.unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lower_version_fails() {
        let host = SqliteHost::in_memory();
        host.open("db", 3, store_upgrade()).await.unwrap();
        let err = host.open("db", 1, store_upgrade()).await.unwrap_err();
        assert_eq!(err.kind(), HostErrorKind::Version);
    }

    #[tokio::test]
    async fn test_upgrade_drops_removed_tables() {
        let host = SqliteHost::in_memory();
        host.open("db", 1, store_upgrade()).await.unwrap();

        let replace: Upgrade = Arc::new(|_: &Schema| ensure_table(&Schema::default(), "other"));
        let conn = host.open("db", 2, replace).await.unwrap();
        assert!(conn.transaction("other", TransactionMode::ReadOnly).is_ok());
        let err = conn
            .transaction("store", TransactionMode::ReadOnly)
            .unwrap_err();
        assert_eq!(err.kind(), HostErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_requests_round_trip_json() {
        let host = SqliteHost::in_memory();
        let conn = host.open("db", 1, store_upgrade()).await.unwrap();
        let value = json!({"name": "Alice", "tags": ["a", "b"], "nested": {"n": 1}});

        let tx = conn.transaction("store", TransactionMode::ReadWrite).unwrap();
        tx.execute(Request::Put {
            key: "user:1".to_string(),
            value: value.clone(),
        })
        .await
        .unwrap();

        let tx = conn.transaction("store", TransactionMode::ReadOnly).unwrap();
        let got = tx
            .execute(Request::Get {
                key: "user:1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(got, Some(value));
    }

    #[tokio::test]
    async fn test_readonly_rejects_put() {
        let host = SqliteHost::in_memory();
        let conn = host.open("db", 1, store_upgrade()).await.unwrap();
        let tx = conn.transaction("store", TransactionMode::ReadOnly).unwrap();
        let err = tx
            .execute(Request::Put {
                key: "k".to_string(),
                value: json!(1),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), HostErrorKind::ReadOnly);
    }

    #[tokio::test]
    async fn test_data_persists_across_hosts() {
        let temp = TempDir::new().unwrap();
        {
            let host = SqliteHost::open_dir(temp.path());
            let conn = host.open("db", 1, store_upgrade()).await.unwrap();
            let tx = conn.transaction("store", TransactionMode::ReadWrite).unwrap();
            tx.execute(Request::Put {
                key: "k".to_string(),
                value: json!("v"),
            })
            .await
            .unwrap();
        }

        let host = SqliteHost::open_dir(temp.path());
        let conn = host.open("db", 1, store_upgrade()).await.unwrap();
        let tx = conn.transaction("store", TransactionMode::ReadOnly).unwrap();
        let got = tx
            .execute(Request::Get {
                key: "k".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(got, Some(json!("v")));
    }

    #[test]
    fn test_database_file_name_encodes_unsafe_bytes() {
        assert_eq!(database_file_name("asyncStorageDB"), "asyncStorageDB.sqlite3");
        assert_eq!(database_file_name("app/v2"), "app%2Fv2.sqlite3");
        assert_eq!(database_file_name("../x"), "%2E%2E%2Fx.sqlite3");
        assert_eq!(database_file_name("a%2F"), "a%252F.sqlite3");
    }

    #[tokio::test]
    async fn test_names_stay_inside_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("inner");
        let host = SqliteHost::open_dir(&dir);

        for name in ["app/v2", "../escaped"] {
            host.open(name, 1, store_upgrade()).await.unwrap();
            let path = host.database_path(name).unwrap();
            assert_eq!(path.parent(), Some(dir.as_path()));
            assert!(path.exists());
        }
        assert!(!temp.path().join("escaped.sqlite3").exists());
    }

    #[tokio::test]
    async fn test_floats_round_trip_exactly() {
        let host = SqliteHost::in_memory();
        let conn = host.open("db", 1, store_upgrade()).await.unwrap();
        for f in [1.071_566_039_146_582_6e-75, 0.1, -2.5e300, f64::MIN_POSITIVE] {
            let tx = conn.transaction("store", TransactionMode::ReadWrite).unwrap();
            tx.execute(Request::Put {
                key: "f".to_string(),
                value: json!(f),
            })
            .await
            .unwrap();

            let tx = conn.transaction("store", TransactionMode::ReadOnly).unwrap();
            let got = tx
                .execute(Request::Get {
                    key: "f".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(got.and_then(|v| v.as_f64()).map(f64::to_bits), Some(f.to_bits()));
        }
    }

    #[test]
    fn test_in_memory_has_no_path() {
        assert!(SqliteHost::in_memory().database_path("db").is_none());
    }
}
