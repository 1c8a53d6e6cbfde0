//! Bounded ledger of recent sales.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use ticket_market_core::{Money, ParticipantId, Ticket};

/// One completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sale {
    /// Per-vendor ticket sequence number
    pub ticket_id: u64,
    /// Vendor that released the ticket
    pub vendor_id: ParticipantId,
    /// Event label
    pub event_name: String,
    /// Price paid
    pub price: Money,
    /// Customer name
    pub customer: String,
    /// When the ticket was withdrawn
    pub sold_at: DateTime<Utc>,
}

impl Sale {
    /// Record of `customer` buying `ticket` at `sold_at`
    #[must_use]
    pub fn new(ticket: &Ticket, customer: impl Into<String>, sold_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id: ticket.id(),
            vendor_id: ticket.vendor_id(),
            event_name: ticket.event_name().to_string(),
            price: ticket.price(),
            customer: customer.into(),
            sold_at,
        }
    }
}

/// FIFO of the most recent sales, oldest dropped first when full.
#[derive(Debug)]
pub struct SalesLedger {
    entries: Mutex<VecDeque<Sale>>,
    max_size: usize,
}

impl SalesLedger {
    /// Create an empty ledger keeping at most `max_size` sales
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    /// Append a sale, evicting the oldest if at capacity
    pub fn record(&self, sale: Sale) {
        if self.max_size == 0 {
            return;
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.max_size {
            entries.pop_front();
        }
        entries.push_back(sale);
    }

    /// The newest `limit` sales, oldest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Sale> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of sales currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the ledger is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the maximum ledger size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(id: u64) -> Sale {
        let ticket = Ticket::new(id, "Show", Money::from_cents(100), ParticipantId::new());
        Sale::new(&ticket, "alice", Utc::now())
    }

    #[test]
    fn evicts_oldest_when_full() {
        let ledger = SalesLedger::new(2);
        ledger.record(sale(1));
        ledger.record(sale(2));
        ledger.record(sale(3));

        let ids: Vec<_> = ledger.recent(10).iter().map(|s| s.ticket_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn recent_returns_newest_in_order() {
        let ledger = SalesLedger::new(10);
        for id in 1..=5 {
            ledger.record(sale(id));
        }
        let ids: Vec<_> = ledger.recent(2).iter().map(|s| s.ticket_id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(ledger.len(), 5);
    }

    #[test]
    fn zero_sized_ledger_keeps_nothing() {
        let ledger = SalesLedger::new(0);
        ledger.record(sale(1));
        assert!(ledger.is_empty());
    }
}
