//! Argument validation for values that end up in ledger keys or documents.

use crate::error::CoreError;
use crate::keys::KEY_SEPARATOR;

/// Maximum length of a report or request identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Validate an identifier that will be embedded in a composite key.
///
/// Identifiers must be non-empty, at most [`MAX_IDENTIFIER_LEN`] bytes, and
/// free of control characters (which includes the key separator).
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::InvalidIdentifier {
            kind,
            reason: "must not be empty".into(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::InvalidIdentifier {
            kind,
            reason: format!("longer than {} bytes", MAX_IDENTIFIER_LEN),
        });
    }

    if value.contains(KEY_SEPARATOR) {
        return Err(CoreError::InvalidIdentifier {
            kind,
            reason: "contains the key separator".into(),
        });
    }

    if value.chars().any(char::is_control) {
        return Err(CoreError::InvalidIdentifier {
            kind,
            reason: "contains control characters".into(),
        });
    }

    Ok(())
}

/// Validate the free-text reason attached to an access request.
pub fn validate_reason(reason: &str, max_len: usize) -> Result<(), CoreError> {
    if reason.len() > max_len {
        return Err(CoreError::TooLong {
            field: "reason",
            max: max_len,
            actual: reason.len(),
        });
    }
    Ok(())
}

/// Validate a report's result payload size.
///
/// The payload is opaque to medgate; only its size is bounded.
pub fn validate_payload(payload: &str, max_len: usize) -> Result<(), CoreError> {
    if payload.len() > max_len {
        return Err(CoreError::TooLong {
            field: "result payload",
            max: max_len,
            actual: payload.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_limits() {
        assert!(validate_identifier("report id", "a").is_ok());
        assert!(validate_identifier("report id", &"a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(validate_identifier("report id", &"a".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
        assert!(validate_identifier("report id", "a\nb").is_err());
    }

    #[test]
    fn test_reason_length() {
        assert!(validate_reason("underwriting", 64).is_ok());
        let err = validate_reason(&"x".repeat(65), 64).unwrap_err();
        assert!(matches!(err, CoreError::TooLong { max: 64, actual: 65, .. }));
    }

    #[test]
    fn test_payload_length() {
        assert!(validate_payload("{}", 2).is_ok());
        assert!(validate_payload("{ }", 2).is_err());
    }
}
