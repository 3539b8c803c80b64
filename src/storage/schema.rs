//! Schema definitions and the table upgrade.
//!
//! The logical schema of a database is its version plus the set of table
//! names. The SQL below is what [`SqliteHost`](crate::storage::SqliteHost)
//! uses to record that schema alongside the entry tables.

use std::collections::BTreeSet;

/// Logical schema of an opened database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Stored schema version. A database that does not exist yet is at 0.
    pub version: u32,
    /// Names of the tables in the database.
    pub tables: BTreeSet<String>,
}

impl Schema {
    /// Returns `true` if `table` exists in this schema.
    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }
}

/// Returns `current` with `table` added.
///
/// Never removes a table, so applying it to its own output changes nothing.
#[must_use]
pub fn ensure_table(current: &Schema, table: &str) -> Schema {
    let mut target = current.clone();
    if !target.has_table(table) {
        target.tables.insert(table.to_string());
    }
    target
}

/// SQL for the metadata tables every `SQLite` database carries.
pub const META_SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Logical tables, one row per table
CREATE TABLE IF NOT EXISTS object_tables (
    name TEXT PRIMARY KEY
);
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";

/// SQL to list logical tables.
pub const LIST_TABLES_SQL: &str = "SELECT name FROM object_tables ORDER BY name;";

/// SQL to register a logical table.
pub const REGISTER_TABLE_SQL: &str = "INSERT OR IGNORE INTO object_tables (name) VALUES (?);";

/// SQL to unregister a logical table.
pub const UNREGISTER_TABLE_SQL: &str = "DELETE FROM object_tables WHERE name = ?;";

/// Returns the quoted SQL identifier backing logical table `table`.
///
/// Entry tables are prefixed with `kv_` so they never collide with the
/// metadata tables.
#[must_use]
pub fn entry_table_ident(table: &str) -> String {
    format!("\"kv_{}\"", table.replace('"', "\"\""))
}

/// SQL creating the entry table for `table`.
#[must_use]
pub fn create_entry_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        entry_table_ident(table)
    )
}

/// SQL dropping the entry table for `table`.
#[must_use]
pub fn drop_entry_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", entry_table_ident(table))
}
