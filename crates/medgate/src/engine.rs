//! The Engine: every authorization operation on reports, tickets and
//! access requests.
//!
//! Each operation resolves its caller, loads what it needs from the ledger,
//! asks `medgate-authz` whether the action is allowed, and commits its
//! writes as one [`WriteBatch`]. Read-check-write sequences carry the bytes
//! they read as batch expectations, so a racing writer makes the commit fail
//! instead of being overwritten. Events go out only after a commit succeeded.

use bytes::Bytes;

use medgate_authz::{
    check_expiry, decide_read, decide_request, filter_tickets, require_owner, require_role,
    ticket_for_approval, Caller, Decision, TicketListing, TicketStatus, TicketView,
};
use medgate_core::{
    fields, validate_payload, validate_reason, AccessRequest, AuthTicket,
    Document, LedgerKey, PartyRef, Report, ReportId, ReportMeta, RequestId, RequestStatus, Role,
    Timestamp,
};
use medgate_store::{Ledger, LedgerEntry, LedgerExt, Selector, StoreError, WriteBatch};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, LedgerEvent};
use crate::identity::{CallContext, IdentityResolver};
use crate::views::{AuthorizedReport, MetadataFilter};

/// The authorization engine.
///
/// Generic over its four collaborators:
/// - `L`: the ledger documents are stored in
/// - `I`: resolves the caller of each invocation
/// - `C`: the time source expiry is checked against
/// - `E`: receives committed state changes
pub struct Engine<L, I, C, E> {
    ledger: L,
    resolver: I,
    clock: C,
    events: E,
    config: EngineConfig,
}

impl<L, I, C, E> Engine<L, I, C, E>
where
    L: Ledger,
    I: IdentityResolver,
    C: Clock,
    E: EventSink,
{
    /// Create a new engine.
    pub fn new(ledger: L, resolver: I, clock: C, events: E, config: EngineConfig) -> Self {
        Self {
            ledger,
            resolver,
            clock,
            events,
            config,
        }
    }

    /// The ledger this engine writes to.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Limits and attribute names in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new report issued by the calling clinic.
    ///
    /// The report's `clinicId` is the caller's registered clinic attribute,
    /// never an argument.
    pub async fn create_report(
        &self,
        ctx: &CallContext,
        report_id: &str,
        patient: &PartyRef,
        payload: &str,
    ) -> Result<ReportMeta> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Clinic)?;
        let clinic_id = caller
            .clinic_id()
            .ok_or_else(|| EngineError::PermissionDenied("caller has no clinic attribute".into()))?
            .to_string();

        let report_id = ReportId::new(report_id)?;
        validate_payload(payload, self.config.max_payload_bytes)?;

        let key = LedgerKey::report(&report_id);
        if self.ledger.get(&key).await?.is_some() {
            return Err(EngineError::ReportExists(report_id.to_string()));
        }

        let now = self.clock.now();
        let report = Report::new(report_id, patient.digest(), clinic_id, payload, now);

        let mut batch = WriteBatch::new();
        batch.expect_absent(key);
        batch.put_document(&report)?;
        self.ledger.commit(batch).await.map_err(|e| match e {
            StoreError::Conflict { .. } => EngineError::ReportExists(report.report_id.to_string()),
            other => other.into(),
        })?;

        tracing::info!(
            report_id = %report.report_id,
            clinic_id = %report.clinic_id,
            "report created"
        );
        self.events.emit(LedgerEvent::ReportCreated {
            report_id: report.report_id.clone(),
            patient_hash: report.patient_hash,
            clinic_id: report.clinic_id.clone(),
            created_at: report.created_at,
        });
        Ok(report.meta())
    }

    /// Return a report's payload to its issuing clinic, its owner, or an
    /// insurer holding a valid ticket for it.
    pub async fn read_report_content(&self, ctx: &CallContext, report_id: &str) -> Result<String> {
        let caller = self.caller(ctx)?;
        let report_id = ReportId::new(report_id)?;
        let report = self.require_report(&report_id).await?;

        let ticket = match caller.role() {
            Role::Insurer => {
                let key = LedgerKey::auth_ticket(&report.patient_hash, &caller.hash(), &report_id);
                self.ledger.get_document::<AuthTicket>(&key).await?
            }
            _ => None,
        };

        let now = self.clock.now();
        let ground = decide_read(&caller, &report, ticket.as_ref(), now)
            .into_result(&report)
            .map_err(|e| {
                tracing::warn!(report_id = %report_id, role = %caller.role(), "read refused: {}", e);
                e
            })?;

        tracing::debug!(report_id = %report_id, ?ground, "report content read");
        Ok(report.result_payload)
    }

    /// List report metadata. Never includes payloads.
    pub async fn list_report_metadata(
        &self,
        ctx: &CallContext,
        filter: MetadataFilter,
    ) -> Result<Vec<ReportMeta>> {
        let caller = self.caller(ctx)?;
        let selector = match filter {
            MetadataFilter::Own => {
                require_role(&caller, Role::Patient)?;
                Selector::reports().with(fields::PATIENT_HASH, caller.hash().to_hex())
            }
            MetadataFilter::Patient(patient) => {
                require_role(&caller, Role::Insurer)?;
                Selector::reports().with(fields::PATIENT_HASH, patient.digest().to_hex())
            }
            MetadataFilter::Issued => {
                require_role(&caller, Role::Clinic)?;
                let clinic = caller.clinic_id().ok_or_else(|| {
                    EngineError::PermissionDenied("caller has no clinic attribute".into())
                })?;
                Selector::reports().with(fields::CLINIC_ID, clinic)
            }
        };

        let entries = self.ledger.query(&selector).await?;
        Ok(decode_entries::<Report>(entries)
            .iter()
            .map(Report::meta)
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Direct grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue (or replace) a ticket letting `target` read one of the calling
    /// patient's reports until `expiry`.
    pub async fn grant_access(
        &self,
        ctx: &CallContext,
        report_id: &str,
        target: &PartyRef,
        expiry: Timestamp,
    ) -> Result<AuthTicket> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Patient)?;

        let report_id = ReportId::new(report_id)?;
        let report = self.require_report(&report_id).await?;
        require_owner(&caller, &report.patient_hash, report_id.as_str())?;

        let now = self.clock.now();
        check_expiry(expiry, now, self.config.max_grant_lifetime_secs)?;

        let ticket = AuthTicket::new(report.patient_hash, target.digest(), report_id, now, expiry);
        self.ledger.put_document(&ticket).await?;

        tracing::info!(report_id = %ticket.report_id, expiry, "access granted");
        self.events.emit(LedgerEvent::AccessGranted {
            report_id: ticket.report_id.clone(),
            patient_hash: ticket.patient_hash,
            target_hash: ticket.target_hash,
            granted_at: ticket.granted_at,
            expiry: ticket.expiry,
        });
        Ok(ticket)
    }

    /// Delete the calling patient's ticket for `(target, report)`.
    ///
    /// Revoking a ticket that does not exist succeeds.
    pub async fn revoke_access(
        &self,
        ctx: &CallContext,
        target: &PartyRef,
        report_id: &str,
    ) -> Result<()> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Patient)?;
        let report_id = ReportId::new(report_id)?;

        let target_hash = target.digest();
        let key = LedgerKey::auth_ticket(&caller.hash(), &target_hash, &report_id);
        if self.ledger.get(&key).await?.is_none() {
            tracing::debug!(key = %key, "revoke of absent ticket");
            return Ok(());
        }

        // Unconditional: a racing revoke or re-grant must not turn this into an error.
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.ledger.commit(batch).await?;

        tracing::info!(report_id = %report_id, "access revoked");
        self.events.emit(LedgerEvent::AccessRevoked {
            report_id,
            patient_hash: caller.hash(),
            target_hash,
            revoked_at: self.clock.now(),
        });
        Ok(())
    }

    /// Tickets the calling patient has issued.
    pub async fn list_granted_tickets(
        &self,
        ctx: &CallContext,
        listing: TicketListing,
    ) -> Result<Vec<TicketView>> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Patient)?;

        let entries = self
            .ledger
            .scan_prefix(&LedgerKey::auth_by_patient(&caller.hash()))
            .await?;
        let tickets = decode_entries::<AuthTicket>(entries);
        Ok(filter_tickets(tickets, self.clock.now(), listing))
    }

    /// Tickets issued to the calling insurer.
    pub async fn list_received_tickets(
        &self,
        ctx: &CallContext,
        listing: TicketListing,
    ) -> Result<Vec<TicketView>> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Insurer)?;

        let entries = self.ledger.query(&self.received_selector(&caller)).await?;
        let tickets = decode_entries::<AuthTicket>(entries);
        Ok(filter_tickets(tickets, self.clock.now(), listing))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request workflow
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask a patient for access to one of their reports.
    ///
    /// `patient` must name the report's owner.
    pub async fn request_access(
        &self,
        ctx: &CallContext,
        report_id: &str,
        patient: &PartyRef,
        reason: &str,
        expiry: Timestamp,
    ) -> Result<RequestId> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Insurer)?;

        let report_id = ReportId::new(report_id)?;
        validate_reason(reason, self.config.max_reason_len)?;
        let report = self.require_report(&report_id).await?;
        if patient.digest() != report.patient_hash {
            return Err(EngineError::InvalidArgument(format!(
                "patient does not own report {}",
                report_id
            )));
        }

        let now = self.clock.now();
        check_expiry(expiry, now, self.config.max_grant_lifetime_secs)?;

        let request = AccessRequest::new(
            self.next_request_id(now)?,
            report_id,
            report.patient_hash,
            caller.hash(),
            reason,
            now,
            expiry,
        );

        let mut batch = WriteBatch::new();
        batch.expect_absent(request.key());
        batch.put_document(&request)?;
        self.ledger.commit(batch).await?;

        tracing::info!(
            request_id = %request.request_id,
            report_id = %request.report_id,
            "access requested"
        );
        self.events.emit(LedgerEvent::AccessRequested {
            request_id: request.request_id.clone(),
            report_id: request.report_id.clone(),
            patient_hash: request.patient_hash,
            requester_hash: request.requester_hash,
            requested_at: request.requested_at,
            expiry: request.expiry,
        });
        Ok(request.request_id)
    }

    /// Approve a pending request and issue the ticket it asked for.
    ///
    /// The status flip and the ticket are one commit.
    pub async fn approve_access_request(
        &self,
        ctx: &CallContext,
        request_id: &str,
    ) -> Result<AuthTicket> {
        let (request, stored) = self.prepare_decision(ctx, request_id, Decision::Approve).await?;
        let ticket = ticket_for_approval(&request, self.clock.now());
        self.commit_decision(&request, stored, Some(&ticket)).await?;

        self.events.emit(LedgerEvent::AccessApproved {
            request_id: request.request_id,
            report_id: request.report_id,
            patient_hash: request.patient_hash,
            requester_hash: request.requester_hash,
            granted_at: ticket.granted_at,
            expiry: ticket.expiry,
        });
        Ok(ticket)
    }

    /// Reject a pending request. No ticket is written.
    pub async fn reject_access_request(
        &self,
        ctx: &CallContext,
        request_id: &str,
    ) -> Result<AccessRequest> {
        let (request, stored) = self.prepare_decision(ctx, request_id, Decision::Reject).await?;
        self.commit_decision(&request, stored, None).await?;

        self.events.emit(LedgerEvent::AccessRejected {
            request_id: request.request_id.clone(),
            report_id: request.report_id.clone(),
            patient_hash: request.patient_hash,
            requester_hash: request.requester_hash,
            rejected_at: self.clock.now(),
        });
        Ok(request)
    }

    /// Fetch one request. Visible to its patient and its requester.
    pub async fn get_access_request(
        &self,
        ctx: &CallContext,
        request_id: &str,
    ) -> Result<AccessRequest> {
        let caller = self.caller(ctx)?;
        let request_id = RequestId::new(request_id)?;
        let (request, _) = self.require_request(&request_id).await?;

        let hash = caller.hash();
        if hash != request.patient_hash && hash != request.requester_hash {
            return Err(EngineError::PermissionDenied(format!(
                "not a party to request {}",
                request_id
            )));
        }
        Ok(request)
    }

    /// Pending requests awaiting the calling patient's decision.
    pub async fn list_pending_requests_for_patient(
        &self,
        ctx: &CallContext,
    ) -> Result<Vec<AccessRequest>> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Patient)?;

        let selector = Selector::requests()
            .with(fields::PATIENT_HASH, caller.hash().to_hex())
            .with(fields::STATUS, RequestStatus::Pending.as_str());
        let entries = self.ledger.query(&selector).await?;
        Ok(decode_entries(entries))
    }

    /// Every request the calling insurer has made, in any state.
    pub async fn list_requests_by_insurer(&self, ctx: &CallContext) -> Result<Vec<AccessRequest>> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Insurer)?;

        let selector = Selector::requests().with(fields::REQUESTER_HASH, caller.hash().to_hex());
        let entries = self.ledger.query(&selector).await?;
        Ok(decode_entries(entries))
    }

    /// Every report the calling insurer may read right now, with content.
    pub async fn list_authorized_reports_for_insurer(
        &self,
        ctx: &CallContext,
    ) -> Result<Vec<AuthorizedReport>> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Insurer)?;

        let now = self.clock.now();
        let entries = self.ledger.query(&self.received_selector(&caller)).await?;

        let mut authorized = Vec::new();
        for ticket in decode_entries::<AuthTicket>(entries) {
            if TicketStatus::of(&ticket, now) == TicketStatus::Expired {
                continue;
            }

            let key = LedgerKey::report(&ticket.report_id);
            let report = match self.ledger.get_document::<Report>(&key).await {
                Ok(Some(report)) => report,
                Ok(None) => {
                    tracing::warn!(report_id = %ticket.report_id, "ticket for missing report");
                    continue;
                }
                Err(StoreError::Document(e)) => {
                    tracing::warn!(key = %key, "skipping malformed report: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if report.patient_hash != ticket.patient_hash {
                tracing::warn!(report_id = %ticket.report_id, "ticket issued by non-owner");
                continue;
            }
            authorized.push(AuthorizedReport::new(report, &ticket));
        }
        Ok(authorized)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn caller(&self, ctx: &CallContext) -> Result<Caller> {
        let caller = self.resolver.resolve(ctx)?;
        tracing::debug!(role = %caller.role(), hash = ?caller.hash(), "caller resolved");
        Ok(caller)
    }

    fn received_selector(&self, caller: &Caller) -> Selector {
        Selector::tickets().with(fields::TARGET_HASH, caller.hash().to_hex())
    }

    fn next_request_id(&self, now: Timestamp) -> Result<RequestId> {
        let nonce: [u8; 8] = rand::random();
        let id = format!(
            "{}_{}_{}",
            self.config.request_id_prefix,
            now,
            hex::encode(nonce)
        );
        Ok(RequestId::new(id)?)
    }

    async fn require_report(&self, report_id: &ReportId) -> Result<Report> {
        self.ledger
            .get_document::<Report>(&LedgerKey::report(report_id))
            .await?
            .ok_or_else(|| EngineError::ReportNotFound(report_id.to_string()))
    }

    /// Load a request together with the exact bytes it was stored as.
    async fn require_request(&self, request_id: &RequestId) -> Result<(AccessRequest, Bytes)> {
        let key = LedgerKey::access_request(request_id);
        let bytes = self
            .ledger
            .get(&key)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;
        let request = AccessRequest::from_json(&bytes).map_err(StoreError::from)?;
        Ok((request, bytes))
    }

    /// Load a request and apply `decision` to it in memory.
    ///
    /// Returns the decided request and the bytes it was loaded from.
    async fn prepare_decision(
        &self,
        ctx: &CallContext,
        request_id: &str,
        decision: Decision,
    ) -> Result<(AccessRequest, Bytes)> {
        let caller = self.caller(ctx)?;
        require_role(&caller, Role::Patient)?;

        let request_id = RequestId::new(request_id)?;
        let (request, stored) = self.require_request(&request_id).await?;
        let decided = decide_request(&request, &caller, decision)?;
        Ok((decided, stored))
    }

    /// Commit a decided request, plus its ticket on approval, provided the
    /// stored request is still exactly `stored`.
    async fn commit_decision(
        &self,
        decided: &AccessRequest,
        stored: Bytes,
        ticket: Option<&AuthTicket>,
    ) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.expect_value(decided.key(), stored);
        batch.put_document(decided)?;
        if let Some(ticket) = ticket {
            batch.put_document(ticket)?;
        }
        self.ledger.commit(batch).await?;

        tracing::info!(
            request_id = %decided.request_id,
            status = %decided.status,
            "access request decided"
        );
        Ok(())
    }
}

/// Decode listing entries, skipping any that are not valid documents.
fn decode_entries<D: Document>(entries: Vec<LedgerEntry>) -> Vec<D> {
    entries
        .into_iter()
        .filter_map(|entry| match D::from_json(&entry.value) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(key = %entry.key, "skipping malformed document: {}", e);
                None
            }
        })
        .collect()
}
