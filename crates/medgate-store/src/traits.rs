//! Ledger trait: the abstract interface for document persistence.
//!
//! This trait allows the engine to be storage-agnostic. Implementations
//! include SQLite (persistent) and in-memory (tests, embedding).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use medgate_core::{CoreError, DocType, Document, IndexTerm, LedgerKey};

use crate::error::Result;

/// A stored key and its raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: LedgerKey,
    pub value: Bytes,
}

/// A single write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite a document, replacing its index terms.
    Put {
        key: LedgerKey,
        doc_type: DocType,
        terms: Vec<IndexTerm>,
        value: Bytes,
    },
    /// Remove a key and its index terms. Removing an absent key is a no-op.
    Delete { key: LedgerKey },
}

impl WriteOp {
    pub fn key(&self) -> &LedgerKey {
        match self {
            WriteOp::Put { key, .. } => key,
            WriteOp::Delete { key } => key,
        }
    }
}

/// What a batch requires of a key's current value at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The key must not exist.
    Absent,
    /// The key must hold exactly these bytes.
    Value(Bytes),
}

/// Writes plus the read-set they were derived from.
///
/// Committing a batch checks every expectation and applies every write as
/// one atomic unit. If any expectation fails, nothing is written. This is
/// how a read-check-write sequence (such as flipping a request's status)
/// stays free of lost updates when callers race.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    reads: Vec<(LedgerKey, Expectation)>,
    writes: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to be absent at commit.
    pub fn expect_absent(&mut self, key: LedgerKey) -> &mut Self {
        self.reads.push((key, Expectation::Absent));
        self
    }

    /// Require `key` to still hold `value` at commit.
    pub fn expect_value(&mut self, key: LedgerKey, value: Bytes) -> &mut Self {
        self.reads.push((key, Expectation::Value(value)));
        self
    }

    /// Encode and stage a document write.
    pub fn put_document<D: Document>(&mut self, doc: &D) -> std::result::Result<&mut Self, CoreError> {
        let value = Bytes::from(doc.to_json()?);
        self.writes.push(WriteOp::Put {
            key: doc.key(),
            doc_type: D::DOC_TYPE,
            terms: doc.index_terms(),
            value,
        });
        Ok(self)
    }

    /// Stage a write of already-encoded bytes.
    pub fn put_raw(
        &mut self,
        key: LedgerKey,
        doc_type: DocType,
        terms: Vec<IndexTerm>,
        value: impl Into<Bytes>,
    ) -> &mut Self {
        self.writes.push(WriteOp::Put {
            key,
            doc_type,
            terms,
            value: value.into(),
        });
        self
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: LedgerKey) -> &mut Self {
        self.writes.push(WriteOp::Delete { key });
        self
    }

    pub fn reads(&self) -> &[(LedgerKey, Expectation)] {
        &self.reads
    }

    pub fn writes(&self) -> &[WriteOp] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// A rich query: all documents of one kind whose indexed fields equal
/// every given value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub doc_type: DocType,
    pub terms: Vec<IndexTerm>,
}

impl Selector {
    pub fn new(doc_type: DocType) -> Self {
        Self {
            doc_type,
            terms: Vec::new(),
        }
    }

    pub fn reports() -> Self {
        Self::new(DocType::Report)
    }

    pub fn tickets() -> Self {
        Self::new(DocType::AuthTicket)
    }

    pub fn requests() -> Self {
        Self::new(DocType::AccessRequest)
    }

    /// Add a `field == value` condition.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push(IndexTerm::new(field, value));
        self
    }
}

/// The Ledger trait: async interface for document persistence.
///
/// # Design Notes
///
/// - **Single-operation atomicity**: each method is atomic on its own;
///   multi-key atomicity is available only through [`Ledger::commit`].
/// - **Ordering**: [`Ledger::scan_prefix`] and [`Ledger::query`] return
///   entries ordered by key.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Get the raw value stored under a key.
    async fn get(&self, key: &LedgerKey) -> Result<Option<Bytes>>;

    /// All entries whose key extends `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &LedgerKey) -> Result<Vec<LedgerEntry>>;

    /// All entries matching a selector, in key order.
    async fn query(&self, selector: &Selector) -> Result<Vec<LedgerEntry>>;

    /// Check the batch's expectations and apply its writes atomically.
    ///
    /// Returns [`StoreError::Conflict`](crate::StoreError::Conflict) if an
    /// expectation does not hold, in which case nothing is written.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

#[async_trait]
impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    async fn get(&self, key: &LedgerKey) -> Result<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn scan_prefix(&self, prefix: &LedgerKey) -> Result<Vec<LedgerEntry>> {
        (**self).scan_prefix(prefix).await
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<LedgerEntry>> {
        (**self).query(selector).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        (**self).commit(batch).await
    }
}

/// Extension trait for typed, single-operation access.
pub trait LedgerExt: Ledger {
    /// Get and decode a document.
    fn get_document<D: Document + Send>(
        &self,
        key: &LedgerKey,
    ) -> impl std::future::Future<Output = Result<Option<D>>> + Send;

    /// Write (or overwrite) a single document.
    fn put_document<D: Document + Sync>(
        &self,
        doc: &D,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a single key. Deleting an absent key succeeds.
    fn delete(&self, key: &LedgerKey) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<L: Ledger + ?Sized> LedgerExt for L {
    async fn get_document<D: Document + Send>(&self, key: &LedgerKey) -> Result<Option<D>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(D::from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_document<D: Document + Sync>(&self, doc: &D) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put_document(doc)?;
        self.commit(batch).await
    }

    async fn delete(&self, key: &LedgerKey) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key.clone());
        self.commit(batch).await
    }
}
