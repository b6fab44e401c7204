//! State-change notifications.
//!
//! Events are emitted after the ledger commit that caused them succeeded.
//! Sinks are fire-and-forget: a sink that cannot deliver drops the event,
//! it never fails the operation.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use medgate_core::{IdentityHash, ReportId, RequestId, Timestamp};

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    ReportCreated {
        report_id: ReportId,
        patient_hash: IdentityHash,
        clinic_id: String,
        created_at: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    AccessGranted {
        report_id: ReportId,
        patient_hash: IdentityHash,
        target_hash: IdentityHash,
        granted_at: Timestamp,
        expiry: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    AccessRevoked {
        report_id: ReportId,
        patient_hash: IdentityHash,
        target_hash: IdentityHash,
        revoked_at: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    AccessRequested {
        request_id: RequestId,
        report_id: ReportId,
        patient_hash: IdentityHash,
        requester_hash: IdentityHash,
        requested_at: Timestamp,
        expiry: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    AccessApproved {
        request_id: RequestId,
        report_id: ReportId,
        patient_hash: IdentityHash,
        requester_hash: IdentityHash,
        granted_at: Timestamp,
        expiry: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    AccessRejected {
        request_id: RequestId,
        report_id: ReportId,
        patient_hash: IdentityHash,
        requester_hash: IdentityHash,
        rejected_at: Timestamp,
    },
}

impl LedgerEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            LedgerEvent::ReportCreated { .. } => "ReportCreated",
            LedgerEvent::AccessGranted { .. } => "AccessGranted",
            LedgerEvent::AccessRevoked { .. } => "AccessRevoked",
            LedgerEvent::AccessRequested { .. } => "AccessRequested",
            LedgerEvent::AccessApproved { .. } => "AccessApproved",
            LedgerEvent::AccessRejected { .. } => "AccessRejected",
        }
    }
}

/// Receives committed state changes.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LedgerEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: LedgerEvent) {
        (**self).emit(event)
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LedgerEvent) {}
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LedgerEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(event = event.name(), %payload, "ledger event"),
            Err(e) => tracing::warn!(event = event.name(), "unencodable ledger event: {}", e),
        }
    }
}

/// Fans events out to in-process subscribers.
///
/// Subscribers that fall more than `capacity` events behind lose the oldest
/// ones. Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LedgerEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: LedgerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("ledger event dropped: no subscribers");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LedgerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
