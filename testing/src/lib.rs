//! # Ticket Market Testing
//!
//! Testing utilities and helpers for the ticket market simulator.
//!
//! This crate provides:
//! - Mock implementations of injected traits (`RecordingSink`, `FixedClock`)
//! - Fixtures for tickets and participant parameters with no pacing delay
//! - Async polling helpers for concurrent assertions
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ticket_market_testing::{RecordingSink, vendor_params};
//!
//! #[tokio::test]
//! async fn vendor_fills_pool() {
//!     let sink = Arc::new(RecordingSink::new());
//!     let market = Marketplace::new(MarketplaceConfig::default(), sink.clone());
//!     market.start(5).unwrap();
//!     market.add_vendor(vendor_params("V1", 5, 5)).unwrap();
//!
//!     assert!(eventually(Duration::from_secs(1), || market.status().current_size == 5).await);
//!     assert_eq!(sink.count("ticket_issued"), 5);
//! }
//! ```

use chrono::{DateTime, Utc};
use ticket_market_core::environment::Clock;

/// Mock implementations of injected traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};
    use ticket_market_core::{MarketEvent, TelemetrySink};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making sale timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_market_testing::mocks::FixedClock;
    /// use ticket_market_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Telemetry sink that keeps every event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<MarketEvent>>,
    }

    impl RecordingSink {
        /// Create an empty sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Copy of everything recorded so far, in order
        #[must_use]
        pub fn events(&self) -> Vec<MarketEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of recorded events whose [`MarketEvent::kind`] is `kind`
        #[must_use]
        pub fn count(&self, kind: &str) -> usize {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|event| event.kind() == kind)
                .count()
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, event: MarketEvent) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }
}

/// Fixtures and async assertion helpers.
pub mod helpers {
    use std::future::Future;
    use std::time::Duration;
    use ticket_market_core::{CustomerParams, Money, ParticipantId, Ticket, VendorParams};

    /// Price used by [`vendor_params`]: $10.00
    pub const DEFAULT_PRICE: Money = Money::from_cents(1000);

    /// Vendor releasing `batch_size` tickets per batch up to `quota`, with no
    /// pause between batches
    #[must_use]
    pub fn vendor_params(name: &str, batch_size: u32, quota: u32) -> VendorParams {
        VendorParams::new(name, "Test Event", batch_size, 0, quota, DEFAULT_PRICE)
    }

    /// Customer buying `quota` tickets with no pause between purchases
    #[must_use]
    pub fn customer_params(name: &str, quota: u32) -> CustomerParams {
        CustomerParams::new(name, 0, quota)
    }

    /// Ticket `id` priced at `cents`, from an anonymous vendor
    #[must_use]
    pub fn ticket(id: u64, cents: u64) -> Ticket {
        Ticket::new(id, "Test Event", Money::from_cents(cents), ParticipantId::new())
    }

    /// Poll `condition` every few milliseconds until it holds or `timeout`
    /// elapses. Returns whether it held.
    pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Await `future`, returning `None` if it takes longer than `timeout`.
    pub async fn within<F: Future>(timeout: Duration, future: F) -> Option<F::Output> {
        tokio::time::timeout(timeout, future).await.ok()
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use ticket_market_core::{Money, VendorParams};

    /// Prices from free up to $1,000.00
    pub fn money() -> impl Strategy<Value = Money> {
        (0u64..=100_000).prop_map(Money::from_cents)
    }

    /// Valid, unpaced vendor parameters
    pub fn vendor_params() -> impl Strategy<Value = VendorParams> {
        ("[A-Za-z][A-Za-z0-9 ]{0,11}", 1u32..=5, 1u32..=20, money()).prop_map(
            |(name, batch, quota, price)| {
                VendorParams::new(name, "Prop Event", batch, 0, quota, price)
            },
        )
    }
}

// Re-export commonly used items
pub use helpers::{DEFAULT_PRICE, customer_params, eventually, ticket, vendor_params, within};
pub use mocks::{FixedClock, RecordingSink, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ticket_market_core::{MarketEvent, TelemetrySink};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn recording_sink_counts_by_kind() {
        let sink = RecordingSink::new();
        sink.record(MarketEvent::PoolEmpty);
        sink.record(MarketEvent::PoolEmpty);
        sink.record(MarketEvent::StopRequested);

        assert_eq!(sink.count("pool_empty"), 2);
        assert_eq!(sink.events().len(), 3);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn fixtures_are_valid() {
        assert!(vendor_params("V", 1, 1).validate().is_ok());
        assert!(customer_params("C", 1).validate().is_ok());
    }

    #[tokio::test]
    async fn eventually_gives_up_after_timeout() {
        assert!(!eventually(Duration::from_millis(20), || false).await);
        assert!(eventually(Duration::from_millis(20), || true).await);
    }
}
