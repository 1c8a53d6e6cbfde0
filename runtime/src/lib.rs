//! # Ticket Market Runtime
//!
//! Concurrent execution of the ticket market simulation.
//!
//! ## Core Components
//!
//! - **`TicketPool`**: bounded FIFO buffer; vendors block while it is full,
//!   customers while it is empty, and a stop request wakes everyone
//! - **Participants**: `Vendor` and `Customer` execution loops, each ending
//!   with a `Termination`
//! - **Roster**: running participant tasks with their cancel handles
//! - **Marketplace**: the orchestrator (start, add, remove, stop, status)
//! - **Telemetry**: `tracing` logs and Prometheus metrics fed by market events
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ticket_market_core::{CustomerParams, Money, VendorParams};
//! use ticket_market_runtime::{Marketplace, MarketplaceConfig, TracingSink};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let market = Marketplace::new(MarketplaceConfig::default(), Arc::new(TracingSink));
//! market.start(5)?;
//! market.add_vendor(VendorParams::new("Vendor 0", "concert", 2, 1, 10, Money::from_cents(4500)))?;
//! market.add_customer(CustomerParams::new("Customer 0", 1, 10))?;
//!
//! let status = market.status();
//! println!("{} tickets in pool", status.current_size);
//!
//! market.stop().await?;
//! # Ok(())
//! # }
//! ```

/// Per-participant cancellation handles
pub mod cancel;

/// The marketplace orchestrator
pub mod marketplace;

/// Prometheus metrics for observability
pub mod metrics;

/// Vendor and customer execution loops
pub mod participant;

/// The bounded ticket pool
pub mod pool;

/// Registry of running participant tasks
pub mod roster;

/// Bounded ledger of recent sales
pub mod sales;

/// `tracing`-backed telemetry sink
pub mod telemetry;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use marketplace::{MarketStatus, Marketplace, MarketplaceConfig, Removal, StopReport};
pub use participant::{Customer, MarketEnvironment, Vendor};
pub use pool::{IssueOutcome, PoolSnapshot, TicketPool, WithdrawOutcome};
pub use roster::{ParticipantExit, Roster, RosterEntry, UnitExit};
pub use sales::{Sale, SalesLedger};
pub use telemetry::TracingSink;
