//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use medgate::{
    AttributeResolver, CallContext, Engine, EngineConfig, FixedClock, RecordingSink,
};
use medgate_core::{IdentityHash, LedgerKey, PartyRef, Role, Timestamp};
use medgate_store::{Ledger, LedgerEntry, MemoryLedger, Result, Selector, StoreError, WriteBatch};

/// The time every harness starts at.
pub const EPOCH: Timestamp = 1_700_000_000;

/// One day in seconds.
pub const DAY: i64 = 86_400;

/// An engine wired to a fixed clock and a recording sink.
pub type TestEngine<L> = Engine<L, AttributeResolver, Arc<FixedClock>, Arc<RecordingSink>>;

/// An engine plus handles on its collaborators.
pub struct Harness<L = Arc<MemoryLedger>> {
    pub engine: TestEngine<L>,
    pub ledger: L,
    pub clock: Arc<FixedClock>,
    pub events: Arc<RecordingSink>,
}

impl Harness<Arc<MemoryLedger>> {
    /// A harness over a fresh in-memory ledger.
    pub fn new() -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new()))
    }
}

impl Default for Harness<Arc<MemoryLedger>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Ledger + Clone> Harness<L> {
    pub fn with_ledger(ledger: L) -> Self {
        Self::with_config(ledger, EngineConfig::default())
    }

    pub fn with_config(ledger: L, config: EngineConfig) -> Self {
        let clock = Arc::new(FixedClock::new(EPOCH));
        let events = Arc::new(RecordingSink::new());
        let engine = Engine::new(
            ledger.clone(),
            AttributeResolver::new(config.attributes.clone()),
            clock.clone(),
            events.clone(),
            config,
        );
        Self {
            engine,
            ledger,
            clock,
            events,
        }
    }

    pub fn now(&self) -> Timestamp {
        medgate::Clock::now(&*self.clock)
    }
}

/// A named party with a role, able to produce its call context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub identity: String,
    pub role: Role,
    pub clinic: Option<String>,
}

impl Party {
    /// Context carrying the default attribute names.
    pub fn ctx(&self) -> CallContext {
        let ctx = CallContext::new()
            .with("enrollmentId", self.identity.as_str())
            .with("role", self.role.as_str());
        match &self.clinic {
            Some(clinic) => ctx.with("clinicId", clinic.as_str()),
            None => ctx,
        }
    }

    pub fn hash(&self) -> IdentityHash {
        IdentityHash::of(&self.identity)
    }

    /// Reference by raw identifier.
    pub fn party_ref(&self) -> PartyRef {
        PartyRef::id(self.identity.as_str())
    }

    /// Reference by precomputed digest.
    pub fn hash_ref(&self) -> PartyRef {
        PartyRef::hash(self.hash())
    }
}

pub fn clinic(identity: &str, clinic_id: &str) -> Party {
    Party {
        identity: identity.to_string(),
        role: Role::Clinic,
        clinic: Some(clinic_id.to_string()),
    }
}

pub fn patient(identity: &str) -> Party {
    Party {
        identity: identity.to_string(),
        role: Role::Patient,
        clinic: None,
    }
}

pub fn insurer(identity: &str) -> Party {
    Party {
        identity: identity.to_string(),
        role: Role::Insurer,
        clinic: None,
    }
}

/// A ledger wrapper that fails or interferes on demand.
///
/// - `fail_commits` makes every commit return [`StoreError::Unavailable`]
///   without touching the inner ledger.
/// - `interfere` stages a batch that is committed to the inner ledger just
///   before the next commit, as a racing writer would.
#[derive(Default)]
pub struct FaultyLedger<L = MemoryLedger> {
    inner: L,
    fail_commits: AtomicBool,
    fail_reads: AtomicBool,
    interference: Mutex<Option<WriteBatch>>,
}

impl<L: Ledger> FaultyLedger<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            interference: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn interfere(&self, batch: WriteBatch) {
        *self
            .interference
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(batch);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<L: Ledger> Ledger for FaultyLedger<L> {
    async fn get(&self, key: &LedgerKey) -> Result<Option<Bytes>> {
        self.check_reads()?;
        self.inner.get(key).await
    }

    async fn scan_prefix(&self, prefix: &LedgerKey) -> Result<Vec<LedgerEntry>> {
        self.check_reads()?;
        self.inner.scan_prefix(prefix).await
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<LedgerEntry>> {
        self.check_reads()?;
        self.inner.query(selector).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }

        let racing = self
            .interference
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(racing) = racing {
            self.inner.commit(racing).await?;
        }

        self.inner.commit(batch).await
    }
}
