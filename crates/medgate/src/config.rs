//! Engine configuration.

use serde::{Deserialize, Serialize};

use medgate_core::{validate_identifier, MAX_IDENTIFIER_LEN};

use crate::error::{EngineError, Result};

/// Longest suffix appended to the prefix of a generated request id:
/// `_`, a signed 64-bit timestamp, `_`, and 16 hex digits.
pub(crate) const REQUEST_ID_SUFFIX_LEN: usize = 1 + 20 + 1 + 16;

/// Longest accepted `request_id_prefix`, so every generated id stays a
/// valid identifier.
pub const MAX_REQUEST_ID_PREFIX_LEN: usize = MAX_IDENTIFIER_LEN - REQUEST_ID_SUFFIX_LEN;

/// Names of the host-provided attributes the default resolver reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    pub identity: String,
    pub role: String,
    pub clinic: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            identity: "enrollmentId".to_string(),
            role: "role".to_string(),
            clinic: "clinicId".to_string(),
        }
    }
}

/// Configuration for the Engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum length of an access request's reason, in bytes.
    pub max_reason_len: usize,
    /// Maximum size of a report's result payload, in bytes.
    pub max_payload_bytes: usize,
    /// Upper bound on `expiry - now` for grants and requests, in seconds.
    pub max_grant_lifetime_secs: Option<i64>,
    /// Prefix of generated request ids.
    pub request_id_prefix: String,
    /// Attribute names read by [`AttributeResolver`](crate::AttributeResolver).
    pub attributes: AttributeNames,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_reason_len: 1024,
            max_payload_bytes: 1024 * 1024,
            max_grant_lifetime_secs: None,
            request_id_prefix: "req".to_string(),
            attributes: AttributeNames::default(),
        }
    }
}

impl EngineConfig {
    /// Load from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_reason_len == 0 {
            return Err(EngineError::Config("max_reason_len must be positive".into()));
        }
        if self.max_payload_bytes == 0 {
            return Err(EngineError::Config("max_payload_bytes must be positive".into()));
        }
        if matches!(self.max_grant_lifetime_secs, Some(max) if max <= 0) {
            return Err(EngineError::Config(
                "max_grant_lifetime_secs must be positive".into(),
            ));
        }
        validate_identifier("request id prefix", &self.request_id_prefix)
            .map_err(|e| EngineError::Config(e.to_string()))?;
        if self.request_id_prefix.len() > MAX_REQUEST_ID_PREFIX_LEN {
            return Err(EngineError::Config(format!(
                "request_id_prefix longer than {} bytes",
                MAX_REQUEST_ID_PREFIX_LEN
            )));
        }

        let names = &self.attributes;
        if names.identity.is_empty() || names.role.is_empty() || names.clinic.is_empty() {
            return Err(EngineError::Config("attribute names must be non-empty".into()));
        }
        Ok(())
    }
}
