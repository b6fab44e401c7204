//! End-to-end flows across clinic, patient and insurer.

use std::sync::Arc;

use medgate::{EngineConfig, ErrorKind, LedgerEvent, MetadataFilter, RequestStatus, TicketListing};
use medgate_core::{LedgerKey, ReportId};
use medgate_store::{MemoryLedger, SqliteLedger, WriteBatch};
use medgate_testkit::{clinic, insurer, patient, FaultyLedger, Harness, DAY, EPOCH};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Owner and issuer reads
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn owner_and_issuer_read_stranger_insurer_denied() -> anyhow::Result<()> {
    init_tracing();
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("A123456789");
    let i = insurer("ins-1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), r#"{"hb":13.5}"#)
        .await?;

    assert_eq!(
        h.engine.read_report_content(&p.ctx(), "R1").await?,
        r#"{"hb":13.5}"#
    );
    assert_eq!(
        h.engine.read_report_content(&doc.ctx(), "R1").await?,
        r#"{"hb":13.5}"#
    );

    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // Another clinic did not issue it.
    let other = clinic("doc-9", "clinic-b");
    let err = h
        .engine
        .read_report_content(&other.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Request workflow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn approved_request_reads_until_expiry() -> anyhow::Result<()> {
    init_tracing();
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("A123456789");
    let i = insurer("ins-1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;

    let expiry = EPOCH + DAY;
    let q1 = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "underwriting", expiry)
        .await?;

    let pending = h.engine.list_pending_requests_for_patient(&p.ctx()).await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, q1);
    assert_eq!(pending[0].requester_hash, i.hash());

    let ticket = h.engine.approve_access_request(&p.ctx(), q1.as_str()).await?;
    assert_eq!(ticket.expiry, expiry);
    assert_eq!(ticket.target_hash, i.hash());

    assert!(h
        .engine
        .list_pending_requests_for_patient(&p.ctx())
        .await?
        .is_empty());
    let mine = h.engine.list_requests_by_insurer(&i.ctx()).await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, RequestStatus::Approved);

    assert_eq!(h.engine.read_report_content(&i.ctx(), "R1").await?, "{}");

    // Still valid at the expiry second itself.
    h.clock.set(expiry);
    assert!(h.engine.read_report_content(&i.ctx(), "R1").await.is_ok());

    h.clock.set(expiry + 1);
    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);

    let names: Vec<_> = h.events.take().iter().map(LedgerEvent::name).collect();
    assert_eq!(names, ["ReportCreated", "AccessRequested", "AccessApproved"]);
    Ok(())
}

#[tokio::test]
async fn rejected_request_issues_no_ticket() -> anyhow::Result<()> {
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("A123456789");
    let i = insurer("ins-1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    let q1 = h
        .engine
        .request_access(&i.ctx(), "R1", &p.hash_ref(), "claims", EPOCH + DAY)
        .await?;

    let rejected = h.engine.reject_access_request(&p.ctx(), q1.as_str()).await?;
    assert_eq!(rejected.status, RequestStatus::Rejected);

    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = h
        .engine
        .approve_access_request(&p.ctx(), q1.as_str())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    assert!(matches!(
        h.events.take().last(),
        Some(LedgerEvent::AccessRejected { .. })
    ));
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Direct grant and revoke
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn grant_then_revoke_ends_access() -> anyhow::Result<()> {
    init_tracing();
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("A123456789");
    let i = insurer("ins-1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    h.engine
        .grant_access(&p.ctx(), "R1", &i.party_ref(), EPOCH + 3600)
        .await?;

    assert_eq!(h.engine.read_report_content(&i.ctx(), "R1").await?, "{}");

    let granted = h
        .engine
        .list_granted_tickets(&p.ctx(), TicketListing::ActiveOnly)
        .await?;
    assert_eq!(granted.len(), 1);
    let received = h
        .engine
        .list_received_tickets(&i.ctx(), TicketListing::ActiveOnly)
        .await?;
    assert_eq!(received.len(), 1);

    h.engine.revoke_access(&p.ctx(), &i.party_ref(), "R1").await?;
    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    // Revoking again is a no-op.
    h.engine.revoke_access(&p.ctx(), &i.party_ref(), "R1").await?;
    let revokes = h
        .events
        .take()
        .into_iter()
        .filter(|e| matches!(e, LedgerEvent::AccessRevoked { .. }))
        .count();
    assert_eq!(revokes, 1);
    Ok(())
}

#[tokio::test]
async fn regrant_overwrites_expiry() -> anyhow::Result<()> {
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    h.engine
        .grant_access(&p.ctx(), "R1", &i.party_ref(), EPOCH + 10)
        .await?;
    h.engine
        .grant_access(&p.ctx(), "R1", &i.party_ref(), EPOCH + DAY)
        .await?;

    let tickets = h
        .engine
        .list_granted_tickets(&p.ctx(), TicketListing::IncludeExpired)
        .await?;
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].ticket.expiry, EPOCH + DAY);

    h.clock.advance(100);
    assert!(h.engine.read_report_content(&i.ctx(), "R1").await.is_ok());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Role gates and ownership
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_owner_may_grant_or_decide() -> anyhow::Result<()> {
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let mallory = patient("P2");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;

    let err = h
        .engine
        .grant_access(&mallory.ctx(), "R1", &mallory.party_ref(), EPOCH + 10)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = h
        .engine
        .grant_access(&i.ctx(), "R1", &i.party_ref(), EPOCH + 10)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let q = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH + 10)
        .await?;
    for ctx in [mallory.ctx(), i.ctx(), doc.ctx()] {
        let err = h
            .engine
            .approve_access_request(&ctx, q.as_str())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    let err = h
        .engine
        .request_access(&p.ctx(), "R1", &p.party_ref(), "x", EPOCH + 10)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = h
        .engine
        .approve_access_request(&p.ctx(), "req_missing")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn metadata_listings_by_role() -> anyhow::Result<()> {
    let h = Harness::new();
    let a = clinic("doc-1", "clinic-a");
    let b = clinic("doc-2", "clinic-b");
    let p = patient("P1");
    let q = patient("P2");
    let i = insurer("I1");

    h.engine
        .create_report(&a.ctx(), "R1", &p.party_ref(), "secret-1")
        .await?;
    h.engine
        .create_report(&b.ctx(), "R2", &p.party_ref(), "secret-2")
        .await?;
    h.engine
        .create_report(&a.ctx(), "R3", &q.party_ref(), "secret-3")
        .await?;

    let own = h
        .engine
        .list_report_metadata(&p.ctx(), MetadataFilter::Own)
        .await?;
    let ids: Vec<_> = own.iter().map(|m| m.report_id.as_str()).collect();
    assert_eq!(ids, ["R1", "R2"]);

    let looked_up = h
        .engine
        .list_report_metadata(&i.ctx(), MetadataFilter::Patient(q.party_ref()))
        .await?;
    assert_eq!(looked_up.len(), 1);
    assert_eq!(looked_up[0].clinic_id, "clinic-a");
    let json = serde_json::to_string(&looked_up)?;
    assert!(!json.contains("secret"));

    let issued = h
        .engine
        .list_report_metadata(&a.ctx(), MetadataFilter::Issued)
        .await?;
    assert_eq!(issued.len(), 2);

    let err = h
        .engine
        .list_report_metadata(&p.ctx(), MetadataFilter::Patient(q.party_ref()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    Ok(())
}

#[tokio::test]
async fn authorized_reports_skip_expired_tickets() -> anyhow::Result<()> {
    let h = Harness::new();
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    for id in ["R1", "R2", "R3"] {
        h.engine
            .create_report(&doc.ctx(), id, &p.party_ref(), id)
            .await?;
    }
    h.engine
        .grant_access(&p.ctx(), "R1", &i.party_ref(), EPOCH + 100)
        .await?;
    h.engine
        .grant_access(&p.ctx(), "R2", &i.party_ref(), EPOCH + DAY)
        .await?;

    let all = h.engine.list_authorized_reports_for_insurer(&i.ctx()).await?;
    assert_eq!(all.len(), 2);

    h.clock.set(EPOCH + 101);
    let live = h.engine.list_authorized_reports_for_insurer(&i.ctx()).await?;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].report_id.as_str(), "R2");
    assert_eq!(live[0].result_payload, "R2");
    assert_eq!(live[0].expiry, EPOCH + DAY);

    let flagged = h
        .engine
        .list_received_tickets(&i.ctx(), TicketListing::IncludeExpired)
        .await?;
    assert_eq!(flagged.len(), 2);
    assert_eq!(flagged.iter().filter(|t| t.expired).count(), 1);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Atomicity and races
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_commit_leaves_request_pending_and_emits_nothing() -> anyhow::Result<()> {
    let ledger = Arc::new(FaultyLedger::new(MemoryLedger::new()));
    let h = Harness::with_ledger(ledger.clone());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    let q = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH + DAY)
        .await?;
    h.events.take();

    ledger.fail_commits(true);
    let err = h
        .engine
        .approve_access_request(&p.ctx(), q.as_str())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(h.events.take().is_empty());

    ledger.fail_commits(false);
    let request = h.engine.get_access_request(&p.ctx(), q.as_str()).await?;
    assert_eq!(request.status, RequestStatus::Pending);
    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    h.engine.approve_access_request(&p.ctx(), q.as_str()).await?;
    assert!(h.engine.read_report_content(&i.ctx(), "R1").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn racing_rejection_defeats_approval() -> anyhow::Result<()> {
    let ledger = Arc::new(FaultyLedger::new(MemoryLedger::new()));
    let h = Harness::with_ledger(ledger.clone());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    let q = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH + DAY)
        .await?;

    // A concurrent rejection lands between the approval's read and commit.
    let mut rejected = h.engine.get_access_request(&p.ctx(), q.as_str()).await?;
    rejected.status = RequestStatus::Rejected;
    let mut racing = WriteBatch::new();
    racing.put_document(&rejected)?;
    ledger.interfere(racing);

    let err = h
        .engine
        .approve_access_request(&p.ctx(), q.as_str())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);

    let stored = h.engine.get_access_request(&p.ctx(), q.as_str()).await?;
    assert_eq!(stored.status, RequestStatus::Rejected);
    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    Ok(())
}

#[tokio::test]
async fn racing_create_reports_already_exists() -> anyhow::Result<()> {
    let ledger = Arc::new(FaultyLedger::new(MemoryLedger::new()));
    let h = Harness::with_ledger(ledger.clone());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");

    let first = medgate::Report::new(
        medgate::ReportId::new("R1")?,
        p.hash(),
        "clinic-a",
        "original",
        EPOCH,
    );
    let mut racing = WriteBatch::new();
    racing.put_document(&first)?;
    ledger.interfere(racing);

    let err = h
        .engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "second")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(h.engine.read_report_content(&p.ctx(), "R1").await?, "original");
    Ok(())
}

#[tokio::test]
async fn revoke_racing_another_revoke_succeeds() -> anyhow::Result<()> {
    let ledger = Arc::new(FaultyLedger::new(MemoryLedger::new()));
    let h = Harness::with_ledger(ledger.clone());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    h.engine
        .grant_access(&p.ctx(), "R1", &i.party_ref(), EPOCH + DAY)
        .await?;

    // Another revoke deletes the ticket between this revoke's read and commit.
    let mut racing = WriteBatch::new();
    racing.delete(LedgerKey::auth_ticket(&p.hash(), &i.hash(), &ReportId::new("R1")?));
    ledger.interfere(racing);

    h.engine.revoke_access(&p.ctx(), &i.party_ref(), "R1").await?;
    let tickets = h
        .engine
        .list_granted_tickets(&p.ctx(), TicketListing::IncludeExpired)
        .await?;
    assert!(tickets.is_empty());
    Ok(())
}

#[tokio::test]
async fn revoke_racing_regrant_removes_ticket() -> anyhow::Result<()> {
    let ledger = Arc::new(FaultyLedger::new(MemoryLedger::new()));
    let h = Harness::with_ledger(ledger.clone());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    let ticket = h
        .engine
        .grant_access(&p.ctx(), "R1", &i.party_ref(), EPOCH + DAY)
        .await?;

    let mut regranted = ticket.clone();
    regranted.expiry = EPOCH + 2 * DAY;
    let mut racing = WriteBatch::new();
    racing.put_document(&regranted)?;
    ledger.interfere(racing);

    h.engine.revoke_access(&p.ctx(), &i.party_ref(), "R1").await?;
    let err = h
        .engine
        .read_report_content(&i.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    Ok(())
}

#[tokio::test]
async fn ledger_read_failure_is_internal() -> anyhow::Result<()> {
    let ledger = Arc::new(FaultyLedger::new(MemoryLedger::new()));
    let h = Harness::with_ledger(ledger.clone());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;

    ledger.fail_reads(true);
    let err = h
        .engine
        .read_report_content(&p.ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    let err = h
        .engine
        .list_authorized_reports_for_insurer(&i.ctx())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    let err = h
        .engine
        .list_report_metadata(&p.ctx(), MetadataFilter::Own)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    ledger.fail_reads(false);
    assert_eq!(h.engine.read_report_content(&p.ctx(), "R1").await?, "{}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_decisions_commit_once() -> anyhow::Result<()> {
    let h = Arc::new(Harness::new());
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    let q = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH + DAY)
        .await?;

    let mut tasks = Vec::new();
    for n in 0..8 {
        let h = h.clone();
        let ctx = p.ctx();
        let id = q.clone();
        tasks.push(tokio::spawn(async move {
            if n % 2 == 0 {
                h.engine.approve_access_request(&ctx, id.as_str()).await.map(|_| ())
            } else {
                h.engine.reject_access_request(&ctx, id.as_str()).await.map(|_| ())
            }
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await? {
            Ok(()) => successes += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::FailedPrecondition),
        }
    }
    assert_eq!(successes, 1);

    let stored = h.engine.get_access_request(&p.ctx(), q.as_str()).await?;
    let ticket_exists = h.engine.read_report_content(&i.ctx(), "R1").await.is_ok();
    assert_eq!(stored.status == RequestStatus::Approved, ticket_exists);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_backed_flow_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("medgate.db");
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    let q = {
        let h = Harness::with_ledger(Arc::new(SqliteLedger::open(&path)?));
        h.engine
            .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
            .await?;
        h.engine
            .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH + DAY)
            .await?
    };

    let h = Harness::with_ledger(Arc::new(SqliteLedger::open(&path)?));
    assert_eq!(
        h.engine.list_pending_requests_for_patient(&p.ctx()).await?.len(),
        1
    );
    h.engine.approve_access_request(&p.ctx(), q.as_str()).await?;
    assert_eq!(h.engine.read_report_content(&i.ctx(), "R1").await?, "{}");
    assert!(h.engine.list_pending_requests_for_patient(&p.ctx()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn custom_config_attribute_names() -> anyhow::Result<()> {
    let config = EngineConfig::from_json(r#"{ "attributes": { "identity": "hf.EnrollmentID" } }"#)?;
    let h = Harness::with_config(Arc::new(MemoryLedger::new()), config);
    let ctx = medgate::CallContext::new()
        .with("hf.EnrollmentID", "doc-1")
        .with("role", "clinic")
        .with("clinicId", "clinic-a");

    h.engine
        .create_report(&ctx, "R1", &patient("P1").party_ref(), "{}")
        .await?;

    // The default attribute name is no longer read.
    let err = h
        .engine
        .read_report_content(&patient("P1").ctx(), "R1")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn longest_request_id_prefix_still_requests() -> anyhow::Result<()> {
    let config = EngineConfig {
        request_id_prefix: "q".repeat(medgate::MAX_REQUEST_ID_PREFIX_LEN),
        ..EngineConfig::default()
    };
    config.validate()?;
    let h = Harness::with_config(Arc::new(MemoryLedger::new()), config);
    let doc = clinic("doc-1", "clinic-a");
    let p = patient("P1");
    let i = insurer("I1");

    h.engine
        .create_report(&doc.ctx(), "R1", &p.party_ref(), "{}")
        .await?;
    let q = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH + DAY)
        .await?;
    assert!(q.as_str().len() <= medgate::core::MAX_IDENTIFIER_LEN);

    // The widest timestamp still yields a valid id.
    h.clock.set(i64::MIN + 1);
    let widest = h
        .engine
        .request_access(&i.ctx(), "R1", &p.party_ref(), "x", EPOCH)
        .await?;
    assert_eq!(widest.as_str().len(), medgate::core::MAX_IDENTIFIER_LEN);
    Ok(())
}
