//! Operation arguments and results that are not stored documents.

use serde::Serialize;

use medgate_core::{AuthTicket, IdentityHash, PartyRef, Report, ReportId, Timestamp};

/// A report an insurer may currently read, with the ticket's expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedReport {
    pub report_id: ReportId,
    pub clinic_id: String,
    pub patient_hash: IdentityHash,
    pub result_payload: String,
    pub created_at: Timestamp,
    pub expiry: Timestamp,
}

impl AuthorizedReport {
    pub fn new(report: Report, ticket: &AuthTicket) -> Self {
        Self {
            report_id: report.report_id,
            clinic_id: report.clinic_id,
            patient_hash: report.patient_hash,
            result_payload: report.result_payload,
            created_at: report.created_at,
            expiry: ticket.expiry,
        }
    }
}

/// Whose report metadata to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    /// The calling patient's own reports.
    Own,
    /// Any patient's reports (insurers only).
    Patient(PartyRef),
    /// Reports issued by the calling clinic.
    Issued,
}
