//! Ledger documents.
//!
//! Three document kinds are stored: [`Report`], [`AuthTicket`] and
//! [`AccessRequest`]. Each carries a `docType` discriminator so rich queries
//! can filter by kind without relying on key structure, and each declares
//! the fields the ledger indexes for it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::IdentityHash;
use crate::error::CoreError;
use crate::keys::LedgerKey;
use crate::types::{ReportId, RequestId, Timestamp};

/// Names of the indexed document fields.
pub mod fields {
    pub const PATIENT_HASH: &str = "patientHash";
    pub const CLINIC_ID: &str = "clinicId";
    pub const TARGET_HASH: &str = "targetHash";
    pub const REPORT_ID: &str = "reportId";
    pub const REQUESTER_HASH: &str = "requesterHash";
    pub const STATUS: &str = "status";
}

/// Document kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocType {
    Report,
    AuthTicket,
    AccessRequest,
}

impl DocType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocType::Report => "Report",
            DocType::AuthTicket => "AuthTicket",
            DocType::AccessRequest => "AccessRequest",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Report" => Ok(DocType::Report),
            "AuthTicket" => Ok(DocType::AuthTicket),
            "AccessRequest" => Ok(DocType::AccessRequest),
            other => Err(CoreError::DecodingError(format!("unknown docType {}", other))),
        }
    }
}

/// One `(field, value)` pair under which a document is indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexTerm {
    pub field: String,
    pub value: String,
}

impl IndexTerm {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A document stored in the ledger.
pub trait Document: Serialize + DeserializeOwned {
    /// The discriminator every instance carries.
    const DOC_TYPE: DocType;

    /// The discriminator this instance was decoded with.
    fn doc_type(&self) -> DocType;

    /// The primary key the document is stored under.
    fn key(&self) -> LedgerKey;

    /// Fields the ledger indexes for rich queries.
    fn index_terms(&self) -> Vec<IndexTerm>;

    /// Encode to JSON.
    fn to_json(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Decode from JSON, rejecting documents of another kind.
    fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        let doc: Self =
            serde_json::from_slice(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        if doc.doc_type() != Self::DOC_TYPE {
            return Err(CoreError::DecodingError(format!(
                "expected docType {}, found {}",
                Self::DOC_TYPE,
                doc.doc_type()
            )));
        }
        Ok(doc)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Report
// ─────────────────────────────────────────────────────────────────────────────

/// A medical test report. Created once by a clinic, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub doc_type: DocType,
    pub report_id: ReportId,
    /// Digest of the owning patient's identity.
    pub patient_hash: IdentityHash,
    /// Issuing clinic, taken from the creator's own clinic attribute.
    pub clinic_id: String,
    /// Opaque result data.
    pub result_payload: String,
    pub created_at: Timestamp,
}

impl Report {
    pub fn new(
        report_id: ReportId,
        patient_hash: IdentityHash,
        clinic_id: impl Into<String>,
        result_payload: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            doc_type: DocType::Report,
            report_id,
            patient_hash,
            clinic_id: clinic_id.into(),
            result_payload: result_payload.into(),
            created_at,
        }
    }

    /// Metadata view: never includes the payload.
    pub fn meta(&self) -> ReportMeta {
        ReportMeta {
            report_id: self.report_id.clone(),
            clinic_id: self.clinic_id.clone(),
            created_at: self.created_at,
        }
    }
}

impl Document for Report {
    const DOC_TYPE: DocType = DocType::Report;

    fn doc_type(&self) -> DocType {
        self.doc_type
    }

    fn key(&self) -> LedgerKey {
        LedgerKey::report(&self.report_id)
    }

    fn index_terms(&self) -> Vec<IndexTerm> {
        vec![
            IndexTerm::new(fields::PATIENT_HASH, self.patient_hash.to_hex()),
            IndexTerm::new(fields::CLINIC_ID, self.clinic_id.clone()),
        ]
    }
}

/// Report metadata returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub report_id: ReportId,
    pub clinic_id: String,
    pub created_at: Timestamp,
}

// ─────────────────────────────────────────────────────────────────────────────
// AuthTicket
// ─────────────────────────────────────────────────────────────────────────────

/// A time-bounded capability letting one grantee read one report.
///
/// At most one ticket exists per `(patient, target, report)`; a later grant
/// overwrites the earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTicket {
    pub doc_type: DocType,
    pub patient_hash: IdentityHash,
    /// Digest of the grantee's identity.
    pub target_hash: IdentityHash,
    pub report_id: ReportId,
    pub granted_at: Timestamp,
    /// Absolute expiry (Unix seconds), inclusive.
    pub expiry: Timestamp,
}

impl AuthTicket {
    pub fn new(
        patient_hash: IdentityHash,
        target_hash: IdentityHash,
        report_id: ReportId,
        granted_at: Timestamp,
        expiry: Timestamp,
    ) -> Self {
        Self {
            doc_type: DocType::AuthTicket,
            patient_hash,
            target_hash,
            report_id,
            granted_at,
            expiry,
        }
    }

    /// A ticket is valid while `now <= expiry`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now <= self.expiry
    }
}

impl Document for AuthTicket {
    const DOC_TYPE: DocType = DocType::AuthTicket;

    fn doc_type(&self) -> DocType {
        self.doc_type
    }

    fn key(&self) -> LedgerKey {
        LedgerKey::auth_ticket(&self.patient_hash, &self.target_hash, &self.report_id)
    }

    fn index_terms(&self) -> Vec<IndexTerm> {
        vec![
            IndexTerm::new(fields::PATIENT_HASH, self.patient_hash.to_hex()),
            IndexTerm::new(fields::TARGET_HASH, self.target_hash.to_hex()),
            IndexTerm::new(fields::REPORT_ID, self.report_id.as_str()),
        ]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AccessRequest
// ─────────────────────────────────────────────────────────────────────────────

/// Status of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An insurer's request to read a report, decided once by the owning patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub doc_type: DocType,
    pub request_id: RequestId,
    pub report_id: ReportId,
    pub patient_hash: IdentityHash,
    pub requester_hash: IdentityHash,
    pub reason: String,
    pub requested_at: Timestamp,
    /// Expiry the resulting ticket will carry if approved.
    pub expiry: Timestamp,
    pub status: RequestStatus,
}

impl AccessRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: RequestId,
        report_id: ReportId,
        patient_hash: IdentityHash,
        requester_hash: IdentityHash,
        reason: impl Into<String>,
        requested_at: Timestamp,
        expiry: Timestamp,
    ) -> Self {
        Self {
            doc_type: DocType::AccessRequest,
            request_id,
            report_id,
            patient_hash,
            requester_hash,
            reason: reason.into(),
            requested_at,
            expiry,
            status: RequestStatus::Pending,
        }
    }
}

impl Document for AccessRequest {
    const DOC_TYPE: DocType = DocType::AccessRequest;

    fn doc_type(&self) -> DocType {
        self.doc_type
    }

    fn key(&self) -> LedgerKey {
        LedgerKey::access_request(&self.request_id)
    }

    fn index_terms(&self) -> Vec<IndexTerm> {
        vec![
            IndexTerm::new(fields::PATIENT_HASH, self.patient_hash.to_hex()),
            IndexTerm::new(fields::REQUESTER_HASH, self.requester_hash.to_hex()),
            IndexTerm::new(fields::STATUS, self.status.as_str()),
            IndexTerm::new(fields::REPORT_ID, self.report_id.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report::new(
            ReportId::new("R1").unwrap(),
            IdentityHash::of("P"),
            "clinic-a",
            r#"{"hb":13.2}"#,
            1_700_000_000,
        )
    }

    #[test]
    fn test_report_json_shape() {
        let report = sample_report();
        let value: serde_json::Value = serde_json::from_slice(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["docType"], "Report");
        assert_eq!(value["reportId"], "R1");
        assert_eq!(value["clinicId"], "clinic-a");
        assert_eq!(value["patientHash"], IdentityHash::of("P").to_hex());
        assert_eq!(value["createdAt"], 1_700_000_000);
    }

    #[test]
    fn test_from_json_rejects_other_doc_type() {
        let ticket = AuthTicket::new(
            IdentityHash::of("P"),
            IdentityHash::of("I"),
            ReportId::new("R1").unwrap(),
            10,
            20,
        );
        let bytes = ticket.to_json().unwrap();

        assert!(AuthTicket::from_json(&bytes).is_ok());
        assert!(Report::from_json(&bytes).is_err());
    }

    #[test]
    fn test_ticket_validity_is_inclusive() {
        let ticket = AuthTicket::new(
            IdentityHash::of("P"),
            IdentityHash::of("I"),
            ReportId::new("R1").unwrap(),
            0,
            1000,
        );

        assert!(ticket.is_valid_at(999));
        assert!(ticket.is_valid_at(1000));
        assert!(!ticket.is_valid_at(1001));
    }

    #[test]
    fn test_request_status_wire_format() {
        assert_eq!(serde_json::to_string(&RequestStatus::Pending).unwrap(), "\"PENDING\"");
        let parsed: RequestStatus = serde_json::from_str("\"REJECTED\"").unwrap();
        assert_eq!(parsed, RequestStatus::Rejected);
        assert!(parsed.is_terminal());
    }

    #[test]
    fn test_request_index_terms_include_status() {
        let request = AccessRequest::new(
            RequestId::new("req_1").unwrap(),
            ReportId::new("R1").unwrap(),
            IdentityHash::of("P"),
            IdentityHash::of("I"),
            "underwriting",
            100,
            200,
        );

        assert!(request
            .index_terms()
            .contains(&IndexTerm::new(fields::STATUS, "PENDING")));
        assert_eq!(request.key().to_string(), "ACCESS_REQUEST/req_1");
    }

    #[test]
    fn test_meta_omits_payload() {
        let meta = sample_report().meta();
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("resultPayload"));
        assert!(json.contains("\"reportId\":\"R1\""));
    }
}
