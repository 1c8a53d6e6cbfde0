//! The ticket value type.

use crate::money::Money;
use crate::participant::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single ticket released by a vendor.
///
/// Tickets are immutable once created. `id` is a per-vendor sequence number
/// starting at 1, so `(vendor_id, id)` identifies a ticket uniquely across a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    id: u64,
    event_name: String,
    price: Money,
    vendor_id: ParticipantId,
}

impl Ticket {
    /// Creates a new ticket
    #[must_use]
    pub fn new(
        id: u64,
        event_name: impl Into<String>,
        price: Money,
        vendor_id: ParticipantId,
    ) -> Self {
        Self {
            id,
            event_name: event_name.into(),
            price,
            vendor_id,
        }
    }

    /// Per-vendor sequence number
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Event this ticket admits to
    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Ticket price
    #[must_use]
    pub const fn price(&self) -> Money {
        self.price
    }

    /// Vendor that released the ticket
    #[must_use]
    pub const fn vendor_id(&self) -> ParticipantId {
        self.vendor_id
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket #{} for '{}' at {}", self.id, self.event_name, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_event_and_price() {
        let ticket = Ticket::new(7, "Concert", Money::from_cents(2550), ParticipantId::new());
        assert_eq!(ticket.to_string(), "ticket #7 for 'Concert' at $25.50");
    }
}
