//! Storage layer for async-storage.
//!
//! The adapter lives in [`adapter`]; it talks to host stores through the
//! traits in [`traits`]. Two hosts ship with the crate: [`MemoryHost`] keeps
//! everything in process, [`SqliteHost`] persists to `SQLite`.

pub mod adapter;
pub mod completion;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use adapter::AsyncStorage;
pub use memory::MemoryHost;
pub use schema::{Schema, ensure_table};
pub use sqlite::SqliteHost;
pub use traits::{
    HostConnection, HostStore, HostTransaction, Operation, Request, TransactionMode, Upgrade,
};

/// Default database name.
pub const DEFAULT_DB_NAME: &str = "asyncStorageDB";

/// Default table name.
pub const DEFAULT_TABLE_NAME: &str = "store";

/// Schema version the adapter opens databases at.
pub const SCHEMA_VERSION: u32 = 1;
