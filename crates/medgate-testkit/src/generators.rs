//! Proptest generators for property-based testing.

use proptest::prelude::*;

use medgate_core::{ReportId, Timestamp};

/// A plausible enrollment identifier.
pub fn identity() -> impl Strategy<Value = String> {
    "[A-Z][0-9]{9}".prop_map(String::from)
}

/// A valid report identifier.
pub fn report_id() -> impl Strategy<Value = ReportId> {
    "[A-Za-z0-9][A-Za-z0-9_.-]{0,31}".prop_filter_map("invalid id", |s| ReportId::new(s).ok())
}

/// A JSON-ish result payload.
pub fn payload() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}", 0u32..1000).prop_map(|(k, v)| format!("{{\"{}\":{}}}", k, v))
}

/// Free-text reason of at most `max_len` characters.
pub fn reason(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('a', 'z'), 1..=max_len.max(1))
        .prop_map(|chars| chars.into_iter().collect())
}

/// Grant or request lifetime in seconds (strictly positive, up to 30 days).
pub fn lifetime() -> impl Strategy<Value = i64> {
    1i64..=30 * 86_400
}

/// An offset relative to an expiry: up to an hour either side of it.
pub fn offset_around_expiry() -> impl Strategy<Value = i64> {
    -3600i64..=3600
}

/// A timestamp that is not in the future relative to `now`.
pub fn not_future(now: Timestamp) -> impl Strategy<Value = Timestamp> {
    (now - 365 * 86_400)..=now
}

/// What a patient does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStep {
    Approve,
    Reject,
}

/// A sequence of decisions applied to one request.
pub fn decision_steps() -> impl Strategy<Value = Vec<DecisionStep>> {
    prop::collection::vec(
        prop_oneof![Just(DecisionStep::Approve), Just(DecisionStep::Reject)],
        1..=5,
    )
}
