//! In-memory implementation of the Ledger trait.
//!
//! Same semantics as SQLite but keeps everything in memory with no
//! persistence. A single `RwLock` makes every commit atomic and
//! serializable with respect to every other operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use medgate_core::{DocType, IndexTerm, LedgerKey};

use crate::error::{Result, StoreError};
use crate::traits::{Expectation, Ledger, LedgerEntry, Selector, WriteBatch, WriteOp};

/// In-memory ledger implementation.
///
/// All data is lost when the ledger is dropped. Thread-safe via RwLock.
pub struct MemoryLedger {
    inner: RwLock<MemoryLedgerInner>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    /// Documents indexed by key.
    entries: BTreeMap<LedgerKey, StoredEntry>,

    /// Secondary index: (docType, field, value) -> keys.
    index: BTreeMap<(DocType, String, String), BTreeSet<LedgerKey>>,
}

struct StoredEntry {
    value: Bytes,
    doc_type: DocType,
    terms: Vec<IndexTerm>,
}

impl MemoryLedger {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryLedgerInner::default()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryLedgerInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryLedgerInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerInner {
    fn check(&self, key: &LedgerKey, expectation: &Expectation) -> Result<()> {
        let current = self.entries.get(key).map(|e| &e.value);
        match (expectation, current) {
            (Expectation::Absent, None) => Ok(()),
            (Expectation::Absent, Some(_)) => Err(StoreError::Conflict {
                key: key.to_string(),
                reason: "key already exists".into(),
            }),
            (Expectation::Value(expected), Some(actual)) if expected == actual => Ok(()),
            (Expectation::Value(_), _) => Err(StoreError::Conflict {
                key: key.to_string(),
                reason: "value changed since it was read".into(),
            }),
        }
    }

    fn put(&mut self, key: LedgerKey, doc_type: DocType, terms: Vec<IndexTerm>, value: Bytes) {
        self.remove(&key);

        for term in &terms {
            self.index
                .entry((doc_type, term.field.clone(), term.value.clone()))
                .or_default()
                .insert(key.clone());
        }

        self.entries.insert(
            key,
            StoredEntry {
                value,
                doc_type,
                terms,
            },
        );
    }

    fn remove(&mut self, key: &LedgerKey) {
        let Some(old) = self.entries.remove(key) else {
            return;
        };

        for term in old.terms {
            let slot = (old.doc_type, term.field, term.value);
            if let Some(keys) = self.index.get_mut(&slot) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(&slot);
                }
            }
        }
    }

    fn matching_keys(&self, selector: &Selector) -> BTreeSet<LedgerKey> {
        let mut terms = selector.terms.iter();

        let Some(first) = terms.next() else {
            return self
                .entries
                .iter()
                .filter(|(_, e)| e.doc_type == selector.doc_type)
                .map(|(k, _)| k.clone())
                .collect();
        };

        let lookup = |term: &IndexTerm| {
            self.index
                .get(&(selector.doc_type, term.field.clone(), term.value.clone()))
        };

        let mut keys = lookup(first).cloned().unwrap_or_default();
        for term in terms {
            match lookup(term) {
                Some(other) => keys.retain(|k| other.contains(k)),
                None => return BTreeSet::new(),
            }
        }
        keys
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get(&self, key: &LedgerKey) -> Result<Option<Bytes>> {
        let inner = self.read()?;
        Ok(inner.entries.get(key).map(|e| e.value.clone()))
    }

    async fn scan_prefix(&self, prefix: &LedgerKey) -> Result<Vec<LedgerEntry>> {
        let inner = self.read()?;

        let entries = inner
            .entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| LedgerEntry {
                key: k.clone(),
                value: e.value.clone(),
            })
            .collect();

        Ok(entries)
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<LedgerEntry>> {
        let inner = self.read()?;

        let entries = inner
            .matching_keys(selector)
            .into_iter()
            .filter_map(|key| {
                inner.entries.get(&key).map(|e| LedgerEntry {
                    value: e.value.clone(),
                    key,
                })
            })
            .collect();

        Ok(entries)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.write()?;

        // Validate the whole read-set before touching anything
        for (key, expectation) in batch.reads() {
            inner.check(key, expectation)?;
        }

        for op in batch.writes() {
            match op.clone() {
                WriteOp::Put {
                    key,
                    doc_type,
                    terms,
                    value,
                } => inner.put(key, doc_type, terms, value),
                WriteOp::Delete { key } => inner.remove(&key),
            }
        }

        tracing::trace!(writes = batch.writes().len(), "memory ledger commit");
        Ok(())
    }
}
