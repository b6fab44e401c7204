//! Composite ledger keys.
//!
//! A key is an ordered tuple `(namespace, c1, c2, ...)` encoded as
//! `namespace \0 c1 \0 c2 \0`. Every component is terminated by the
//! separator, which gives two properties the ledger relies on:
//!
//! - **Prefix scans**: the encoding of a partial tuple is a byte prefix of
//!   every full tuple extending it, and of nothing else (`P1` never matches
//!   `P10`).
//! - **Order preservation**: byte order of encoded keys equals
//!   lexicographic order of the tuples.
//!
//! Components may not contain the separator; validated identifier types
//! and hex digests never do.

use std::fmt;

use crate::crypto::IdentityHash;
use crate::error::CoreError;
use crate::types::{ReportId, RequestId};

/// Separator terminating every key component.
pub const KEY_SEPARATOR: char = '\u{0}';

/// Top-level key namespaces, one per document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Report,
    Auth,
    AccessRequest,
}

impl Namespace {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Namespace::Report => "REPORT",
            Namespace::Auth => "AUTH",
            Namespace::AccessRequest => "ACCESS_REQUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REPORT" => Some(Namespace::Report),
            "AUTH" => Some(Namespace::Auth),
            "ACCESS_REQUEST" => Some(Namespace::AccessRequest),
            _ => None,
        }
    }
}

/// An encoded composite key (full or partial).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey(String);

impl LedgerKey {
    /// Encode a namespace and components, validating each component.
    pub fn composite(namespace: Namespace, components: &[&str]) -> Result<Self, CoreError> {
        for component in components {
            if component.contains(KEY_SEPARATOR) {
                return Err(CoreError::InvalidKeyComponent(component.replace(KEY_SEPARATOR, "\\0")));
            }
        }
        Ok(Self::encode(namespace, components))
    }

    fn encode(namespace: Namespace, components: &[&str]) -> Self {
        let mut key = String::with_capacity(
            namespace.as_str().len() + components.iter().map(|c| c.len() + 1).sum::<usize>() + 1,
        );
        key.push_str(namespace.as_str());
        key.push(KEY_SEPARATOR);
        for component in components {
            key.push_str(component);
            key.push(KEY_SEPARATOR);
        }
        Self(key)
    }

    /// The partial key covering an entire namespace.
    pub fn namespace(namespace: Namespace) -> Self {
        Self::encode(namespace, &[])
    }

    /// `REPORT/{reportId}`
    pub fn report(report_id: &ReportId) -> Self {
        Self::encode(Namespace::Report, &[report_id.as_str()])
    }

    /// `AUTH/{patientHash}/{targetHash}/{reportId}`
    pub fn auth_ticket(patient: &IdentityHash, target: &IdentityHash, report_id: &ReportId) -> Self {
        Self::encode(
            Namespace::Auth,
            &[&patient.to_hex(), &target.to_hex(), report_id.as_str()],
        )
    }

    /// Partial key: every ticket granted by a patient.
    pub fn auth_by_patient(patient: &IdentityHash) -> Self {
        Self::encode(Namespace::Auth, &[&patient.to_hex()])
    }

    /// Partial key: every ticket a patient granted to one target.
    pub fn auth_by_pair(patient: &IdentityHash, target: &IdentityHash) -> Self {
        Self::encode(Namespace::Auth, &[&patient.to_hex(), &target.to_hex()])
    }

    /// `ACCESS_REQUEST/{requestId}`
    pub fn access_request(request_id: &RequestId) -> Self {
        Self::encode(Namespace::AccessRequest, &[request_id.as_str()])
    }

    /// Rebuild a key from its stored byte form.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CoreError> {
        let key = String::from_utf8(bytes).map_err(|e| CoreError::MalformedKey(e.to_string()))?;
        if !key.ends_with(KEY_SEPARATOR) {
            return Err(CoreError::MalformedKey("missing terminator".into()));
        }
        let namespace = key.split(KEY_SEPARATOR).next().unwrap_or_default();
        if Namespace::parse(namespace).is_none() {
            return Err(CoreError::MalformedKey(format!("unknown namespace {}", namespace)));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The namespace this key lives in.
    pub fn namespace_of(&self) -> Option<Namespace> {
        self.0.split(KEY_SEPARATOR).next().and_then(Namespace::parse)
    }

    /// The components after the namespace.
    pub fn components(&self) -> Vec<&str> {
        let mut parts: Vec<&str> = self.0.split(KEY_SEPARATOR).skip(1).collect();
        // Trailing terminator yields one empty element.
        parts.pop();
        parts
    }

    /// Whether `prefix` is a (partial) key this key extends.
    pub fn starts_with(&self, prefix: &LedgerKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Smallest key strictly greater than every key sharing this prefix.
    ///
    /// Encoded keys always end in the separator (`0x00`), so bumping that
    /// final byte to `0x01` yields the exclusive upper bound of a range scan.
    pub fn prefix_upper_bound(&self) -> Vec<u8> {
        let mut bound = self.0.as_bytes().to_vec();
        if let Some(last) = bound.last_mut() {
            *last = 0x01;
        }
        bound
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trimmed = self.0.strip_suffix(KEY_SEPARATOR).unwrap_or(&self.0);
        f.write_str(&trimmed.replace(KEY_SEPARATOR, "/"))
    }
}

impl fmt::Debug for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerKey({})", self)
    }
}
