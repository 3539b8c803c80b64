//! # async-storage
//!
//! A lazy-connecting asynchronous key-value adapter over host object stores.
//!
//! [`AsyncStorage`] offers `set_item`, `get_item`, `remove_item` and `clear`
//! over any [`HostStore`]: a store that opens versioned databases, starts
//! per-table transactions and settles each request exactly once.
//!
//! ## Features
//!
//! - **Lazy connection**: the database opens on first use and is reused after
//! - **One-time schema upgrade**: the table is created when the database is new
//! - **Typed values**: anything `serde` can serialize, with `None` for missing keys
//! - **Hosts**: in-memory ([`MemoryHost`]) and `SQLite` ([`SqliteHost`])

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types at crate root
pub use error::{Error, HostError, HostErrorKind, Result, StorageError};

pub use config::StorageConfig;

// Re-export storage types
pub use storage::{
    AsyncStorage, DEFAULT_DB_NAME, DEFAULT_TABLE_NAME, HostConnection, HostStore,
    HostTransaction, MemoryHost, Operation, Request, SCHEMA_VERSION, Schema, SqliteHost,
    TransactionMode, Upgrade,
};
