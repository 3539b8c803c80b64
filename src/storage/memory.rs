//! In-process host store.
//!
//! Keeps every database in memory behind a shared lock. Clones of a
//! [`MemoryHost`] share the same databases, which makes it a drop-in host for
//! tests and for callers who need the adapter contract without durability.
//! One-shot fault injection simulates host failures at each boundary step.

use crate::error::HostError;
use crate::storage::schema::Schema;
use crate::storage::traits::{
    HostConnection, HostStore, HostTransaction, Request, TransactionMode, Upgrade,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

type Table = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct Database {
    version: u32,
    tables: HashMap<String, Table>,
}

impl Database {
    fn schema(&self) -> Schema {
        Schema {
            version: self.version,
            tables: self.tables.keys().cloned().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    open: Option<HostError>,
    transaction: Option<HostError>,
    request: Option<HostError>,
}

#[derive(Debug, Default)]
struct Shared {
    databases: RwLock<HashMap<String, Database>>,
    faults: Mutex<Faults>,
    opens: AtomicUsize,
    upgrades: AtomicUsize,
}

/// Host store keeping all databases in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    shared: Arc<Shared>,
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`HostStore::open`] fail with `err`.
    pub fn fail_next_open(&self, err: HostError) {
        self.shared.faults.lock().open = Some(err);
    }

    /// Makes the next [`HostConnection::transaction`] fail with `err`.
    pub fn fail_next_transaction(&self, err: HostError) {
        self.shared.faults.lock().transaction = Some(err);
    }

    /// Makes the next [`HostTransaction::execute`] fail with `err`.
    pub fn fail_next_request(&self, err: HostError) {
        self.shared.faults.lock().request = Some(err);
    }

    /// Number of open attempts this host has received, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Number of schema upgrades this host has applied.
    #[must_use]
    pub fn upgrade_count(&self) -> usize {
        self.shared.upgrades.load(Ordering::SeqCst)
    }

    /// Returns the stored schema of `name`, if the database exists.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<Schema> {
        self.shared.databases.read().get(name).map(Database::schema)
    }

    fn open_now(&self, name: &str, version: u32, upgrade: &Upgrade) -> Result<(), HostError> {
        if let Some(err) = self.shared.faults.lock().open.take() {
            return Err(err);
        }
        if version == 0 {
            return Err(HostError::version("version must be at least 1"));
        }

        let mut databases = self.shared.databases.write();
        let db = databases.entry(name.to_string()).or_default();
        if db.version > version {
            return Err(HostError::version(format!(
                "requested version {version} is less than stored version {}",
                db.version
            )));
        }
        if db.version < version {
            let target = upgrade(&db.schema());
            db.tables.retain(|table, _| target.has_table(table));
            for table in target.tables {
                db.tables.entry(table).or_default();
            }
            debug!(database = %name, from = db.version, to = version, "applied schema upgrade");
            db.version = version;
            self.shared.upgrades.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl HostStore for MemoryHost {
    type Connection = MemoryConnection;

    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: Upgrade,
    ) -> Result<Self::Connection, HostError> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        // Opening completes on a later poll, as it does for real hosts.
        tokio::task::yield_now().await;
        self.open_now(name, version, &upgrade)?;
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            database: name.to_string(),
        })
    }
}

/// Connection to one [`MemoryHost`] database.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
    database: String,
}

impl HostConnection for MemoryConnection {
    type Transaction = MemoryTransaction;

    fn transaction(
        &self,
        table: &str,
        mode: TransactionMode,
    ) -> Result<Self::Transaction, HostError> {
        if let Some(err) = self.shared.faults.lock().transaction.take() {
            return Err(err);
        }
        let databases = self.shared.databases.read();
        let exists = databases
            .get(&self.database)
            .is_some_and(|db| db.tables.contains_key(table));
        if !exists {
            return Err(HostError::not_found(format!(
                "table `{table}` does not exist in database `{}`",
                self.database
            )));
        }
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            database: self.database.clone(),
            table: table.to_string(),
            mode,
        })
    }
}

/// Transaction scoping one request against a [`MemoryHost`] table.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    database: String,
    table: String,
    mode: TransactionMode,
}

impl MemoryTransaction {
    fn apply(&self, request: Request) -> Result<Option<Value>, HostError> {
        if let Some(err) = self.shared.faults.lock().request.take() {
            return Err(err);
        }
        request.check_mode(self.mode)?;

        let mut databases = self.shared.databases.write();
        let table = databases
            .get_mut(&self.database)
            .and_then(|db| db.tables.get_mut(&self.table))
            .ok_or_else(|| {
                HostError::not_found(format!("table `{}` no longer exists", self.table))
            })?;

        Ok(match request {
            Request::Put { key, value } => {
                table.insert(key, value);
                None
            }
            Request::Get { key } => table.get(&key).cloned(),
            Request::Delete { key } => {
                table.remove(&key);
                None
            }
            Request::Clear => {
                table.clear();
                None
            }
        })
    }
}

#[async_trait]
impl HostTransaction for MemoryTransaction {
    async fn execute(self, request: Request) -> Result<Option<Value>, HostError> {
        self.apply(request)
    }
}
