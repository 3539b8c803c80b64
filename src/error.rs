//! Error types for async-storage operations.
//!
//! Host stores report failures as [`HostError`]; the adapter wraps them in
//! [`StorageError`] so callers see which database, table and operation the
//! failure came from while the host's error stays reachable as the source.

use crate::storage::traits::Operation;
use std::fmt;
use thiserror::Error;

/// Result type alias for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage adapter errors (open or request failures).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Classification of a host store failure.
///
/// Rendered with the exception names host object stores use, so a message
/// read from the adapter matches the one the host reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostErrorKind {
    /// The requested schema version is lower than the stored one, or invalid.
    Version,
    /// The named table does not exist in the opened database.
    NotFound,
    /// A write was issued inside a read-only transaction.
    ReadOnly,
    /// A stored or supplied value could not be encoded or decoded.
    Data,
    /// The request or transaction was aborted before it completed.
    Abort,
    /// The host is not in a state that allows the call.
    InvalidState,
    /// Any other host failure.
    Unknown,
}

impl HostErrorKind {
    /// Returns the host exception name for this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Version => "VersionError",
            Self::NotFound => "NotFoundError",
            Self::ReadOnly => "ReadOnlyError",
            Self::Data => "DataError",
            Self::Abort => "AbortError",
            Self::InvalidState => "InvalidStateError",
            Self::Unknown => "UnknownError",
        }
    }
}

impl fmt::Display for HostErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by a host store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct HostError {
    kind: HostErrorKind,
    message: String,
}

impl HostError {
    /// Creates a host error of the given kind.
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`HostErrorKind::Version`].
    pub fn version(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Version, message)
    }

    /// Shorthand for [`HostErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::NotFound, message)
    }

    /// Shorthand for [`HostErrorKind::ReadOnly`].
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::ReadOnly, message)
    }

    /// Shorthand for [`HostErrorKind::Data`].
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Data, message)
    }

    /// Shorthand for [`HostErrorKind::Abort`].
    pub fn abort(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Abort, message)
    }

    /// Shorthand for [`HostErrorKind::Unknown`].
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Unknown, message)
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> HostErrorKind {
        self.kind
    }

    /// Returns the host-supplied message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<rusqlite::Error> for HostError {
    fn from(err: rusqlite::Error) -> Self {
        Self::unknown(err.to_string())
    }
}

/// Errors surfaced by [`AsyncStorage`](crate::AsyncStorage) operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Opening or upgrading the database failed. Nothing was cached, so the
    /// next operation opens again.
    #[error("failed to open database `{database}`: {source}")]
    Open {
        /// Database name passed to the host.
        database: String,
        /// Error reported by the host.
        #[source]
        source: HostError,
    },

    /// Opening the transaction or executing the request failed.
    #[error("{operation} request on table `{table}` failed: {source}")]
    Request {
        /// Operation that failed.
        operation: Operation,
        /// Table the request targeted.
        table: String,
        /// Error reported by the host.
        #[source]
        source: HostError,
    },

    /// A value could not be converted to or from its stored form.
    #[error("value for key `{key}` could not be converted: {source}")]
    Serialization {
        /// Key whose value failed to convert.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Returns the host error behind this failure, if the host reported one.
    #[must_use]
    pub const fn host_error(&self) -> Option<&HostError> {
        match self {
            Self::Open { source, .. } | Self::Request { source, .. } => Some(source),
            Self::Serialization { .. } => None,
        }
    }
}
