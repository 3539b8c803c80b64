//! Host store boundary.
//!
//! A host store exposes three primitives: open a versioned database,
//! start a transaction on one table, and execute one request inside that
//! transaction. Everything the adapter does is expressed through these
//! traits, so any key-value engine with open/read/write/delete/clear and an
//! asynchronous completion signal can sit behind [`AsyncStorage`](crate::AsyncStorage).

use crate::error::HostError;
use crate::storage::schema::Schema;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Schema upgrade callback handed to [`HostStore::open`].
///
/// Receives the stored schema and returns the target schema. Hosts call it
/// only when the stored version is below the requested one.
pub type Upgrade = Arc<dyn Fn(&Schema) -> Schema + Send + Sync>;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("readonly"),
            Self::ReadWrite => f.write_str("readwrite"),
        }
    }
}

/// Kind of request, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Upsert one entry.
    Put,
    /// Look up one entry.
    Get,
    /// Delete one entry if present.
    Delete,
    /// Delete every entry in the table.
    Clear,
}

impl Operation {
    /// Returns the transaction mode this operation needs.
    #[must_use]
    pub const fn mode(self) -> TransactionMode {
        match self {
            Self::Get => TransactionMode::ReadOnly,
            Self::Put | Self::Delete | Self::Clear => TransactionMode::ReadWrite,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::Delete => "delete",
            Self::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// A single request against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Insert or overwrite `key` with `value`.
    Put {
        /// Entry key.
        key: String,
        /// Entry value.
        value: Value,
    },
    /// Read the value stored under `key`.
    Get {
        /// Entry key.
        key: String,
    },
    /// Delete `key`; succeeds when the key is absent.
    Delete {
        /// Entry key.
        key: String,
    },
    /// Delete every entry.
    Clear,
}

impl Request {
    /// Returns the payload-free operation tag.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Put { .. } => Operation::Put,
            Self::Get { .. } => Operation::Get,
            Self::Delete { .. } => Operation::Delete,
            Self::Clear => Operation::Clear,
        }
    }

    /// Checks that this request may run in a transaction opened with `mode`.
    ///
    /// # Errors
    ///
    /// Returns a [`HostErrorKind::ReadOnly`](crate::HostErrorKind::ReadOnly)
    /// error for writes inside a read-only transaction.
    pub fn check_mode(&self, mode: TransactionMode) -> Result<(), HostError> {
        let operation = self.operation();
        if mode == TransactionMode::ReadOnly && operation.mode() == TransactionMode::ReadWrite {
            return Err(HostError::read_only(format!(
                "{operation} is not allowed in a {mode} transaction"
            )));
        }
        Ok(())
    }
}

/// A host key-value store that can open named, versioned databases.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Connection handle returned by a successful open.
    type Connection: HostConnection;

    /// Opens database `name` at schema `version`.
    ///
    /// When the stored version is lower than `version` (a fresh database is
    /// at version 0), the host calls `upgrade` once with the stored schema,
    /// applies the returned schema atomically and records `version`.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the database cannot be opened, the
    /// stored version is higher than `version`, or the upgrade fails.
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: Upgrade,
    ) -> Result<Self::Connection, HostError>;
}

/// An open database.
pub trait HostConnection: Send + Sync {
    /// Transaction type scoping one request.
    type Transaction: HostTransaction;

    /// Starts a transaction on `table`.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the table does not exist or the
    /// connection cannot start a transaction.
    fn transaction(
        &self,
        table: &str,
        mode: TransactionMode,
    ) -> Result<Self::Transaction, HostError>;
}

/// A transaction that executes exactly one request.
#[async_trait]
pub trait HostTransaction: Send {
    /// Executes `request`, consuming the transaction.
    ///
    /// Resolves once, with the stored value for [`Request::Get`] (or `None`
    /// when the key is absent) and `None` for every other request.
    ///
    /// # Errors
    ///
    /// Returns the host's error when the request fails; the request has no
    /// effect in that case.
    async fn execute(self, request: Request) -> Result<Option<Value>, HostError>;
}
