//! Ticket validity and listing views.
//!
//! Expiry is evaluated lazily: an expired ticket may still be stored, but
//! every read treats it as absent (or flags it, for listings that ask).

use serde::Serialize;

use medgate_core::{AuthTicket, Timestamp};

/// Validity of a ticket at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// `now <= expiry`
    Active,
    /// `now > expiry`
    Expired,
}

impl TicketStatus {
    pub fn of(ticket: &AuthTicket, now: Timestamp) -> Self {
        if ticket.is_valid_at(now) {
            TicketStatus::Active
        } else {
            TicketStatus::Expired
        }
    }
}

/// Which tickets a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketListing {
    /// Only tickets still valid; expired ones are omitted.
    #[default]
    ActiveOnly,
    /// Every stored ticket, with expired ones flagged.
    IncludeExpired,
}

/// A ticket as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: AuthTicket,
    pub expired: bool,
}

/// Apply a listing variant to a set of tickets.
pub fn filter_tickets(
    tickets: impl IntoIterator<Item = AuthTicket>,
    now: Timestamp,
    listing: TicketListing,
) -> Vec<TicketView> {
    tickets
        .into_iter()
        .filter_map(|ticket| {
            let expired = TicketStatus::of(&ticket, now) == TicketStatus::Expired;
            match (listing, expired) {
                (TicketListing::ActiveOnly, true) => None,
                _ => Some(TicketView { ticket, expired }),
            }
        })
        .collect()
}
