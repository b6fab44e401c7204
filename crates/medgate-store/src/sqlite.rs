//! SQLite implementation of the Ledger trait.
//!
//! This is the persistent backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`. Commits run inside a
//! single SQL transaction, so expectations, document writes and index
//! maintenance succeed or fail together.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};

use medgate_core::LedgerKey;

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{Expectation, Ledger, LedgerEntry, Selector, WriteBatch, WriteOp};

/// SQLite-based ledger implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

/// Decode `(key, value)` rows, skipping keys that are not valid ledger keys.
fn collect_entries(rows: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<LedgerEntry> {
    rows.into_iter()
        .filter_map(|(key, value)| match LedgerKey::from_bytes(key) {
            Ok(key) => Some(LedgerEntry {
                key,
                value: Bytes::from(value),
            }),
            Err(e) => {
                tracing::warn!("skipping malformed ledger key: {}", e);
                None
            }
        })
        .collect()
}

fn check_expectation(tx: &Transaction<'_>, key: &LedgerKey, expectation: &Expectation) -> Result<()> {
    let current: Option<Vec<u8>> = tx
        .query_row(
            "SELECT value FROM ledger WHERE key = ?1",
            params![key.as_bytes()],
            |row| row.get(0),
        )
        .optional()?;

    match (expectation, current) {
        (Expectation::Absent, None) => Ok(()),
        (Expectation::Absent, Some(_)) => Err(StoreError::Conflict {
            key: key.to_string(),
            reason: "key already exists".into(),
        }),
        (Expectation::Value(expected), Some(actual)) if expected.as_ref() == actual.as_slice() => {
            Ok(())
        }
        (Expectation::Value(_), _) => Err(StoreError::Conflict {
            key: key.to_string(),
            reason: "value changed since it was read".into(),
        }),
    }
}

fn apply_write(tx: &Transaction<'_>, op: &WriteOp, now: i64) -> Result<()> {
    match op {
        WriteOp::Put {
            key,
            doc_type,
            terms,
            value,
        } => {
            tx.execute(
                "DELETE FROM ledger_index WHERE key = ?1",
                params![key.as_bytes()],
            )?;
            tx.execute(
                "INSERT INTO ledger (key, doc_type, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    doc_type = excluded.doc_type,
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![key.as_bytes(), doc_type.as_str(), value.as_ref(), now],
            )?;
            for term in terms {
                tx.execute(
                    "INSERT OR IGNORE INTO ledger_index (doc_type, field, value, key)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![doc_type.as_str(), term.field, term.value, key.as_bytes()],
                )?;
            }
        }
        WriteOp::Delete { key } => {
            tx.execute(
                "DELETE FROM ledger_index WHERE key = ?1",
                params![key.as_bytes()],
            )?;
            tx.execute("DELETE FROM ledger WHERE key = ?1", params![key.as_bytes()])?;
        }
    }
    Ok(())
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn get(&self, key: &LedgerKey) -> Result<Option<Bytes>> {
        let key = key.clone();

        self.blocking(move |conn| {
            let value: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT value FROM ledger WHERE key = ?1",
                    params![key.as_bytes()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(Bytes::from))
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &LedgerKey) -> Result<Vec<LedgerEntry>> {
        let lower = prefix.as_bytes().to_vec();
        let upper = prefix.prefix_upper_bound();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value FROM ledger
                 WHERE key >= ?1 AND key < ?2
                 ORDER BY key",
            )?;

            let rows = stmt
                .query_map(params![lower, upper], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(collect_entries(rows))
        })
        .await
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<LedgerEntry>> {
        let selector = selector.clone();

        self.blocking(move |conn| {
            let doc_type = selector.doc_type.as_str().to_string();
            let mut sql = String::from("SELECT l.key, l.value FROM ledger l WHERE l.doc_type = ?1");
            let mut args: Vec<String> = vec![doc_type.clone()];

            for term in &selector.terms {
                let base = args.len();
                sql.push_str(&format!(
                    " AND EXISTS (SELECT 1 FROM ledger_index i
                        WHERE i.key = l.key AND i.doc_type = ?{} AND i.field = ?{} AND i.value = ?{})",
                    base + 1,
                    base + 2,
                    base + 3
                ));
                args.push(doc_type.clone());
                args.push(term.field.clone());
                args.push(term.value.clone());
            }
            sql.push_str(" ORDER BY l.key");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(collect_entries(rows))
        })
        .await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            // Dropping `tx` on an early return rolls everything back
            for (key, expectation) in batch.reads() {
                check_expectation(&tx, key, expectation)?;
            }

            let now = now_millis();
            for op in batch.writes() {
                apply_write(&tx, op, now)?;
            }

            tx.commit()?;
            tracing::trace!(writes = batch.writes().len(), "sqlite ledger commit");
            Ok(())
        })
        .await
    }
}
