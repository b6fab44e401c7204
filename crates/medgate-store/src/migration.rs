//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied ledger schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Ledger entries: one row per composite key
        CREATE TABLE ledger (
            key BLOB PRIMARY KEY,             -- encoded composite key, NUL-terminated components
            doc_type TEXT NOT NULL,           -- Report | AuthTicket | AccessRequest
            value BLOB NOT NULL,              -- JSON document
            updated_at INTEGER NOT NULL       -- local write time (Unix ms)
        );

        -- Secondary index for rich queries, maintained in the same
        -- transaction as the ledger row it reflects
        CREATE TABLE ledger_index (
            doc_type TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            key BLOB NOT NULL,
            PRIMARY KEY (doc_type, field, value, key)
        );

        CREATE INDEX idx_ledger_doc_type ON ledger(doc_type);
        CREATE INDEX idx_ledger_index_key ON ledger_index(key);
        "#,
    )?;

    Ok(())
}

/// Current time in milliseconds; zero if the clock is before the epoch.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
