//! Vendor and customer execution loops.
//!
//! A [`Vendor`] releases tickets in batches; a [`Customer`] buys them one at
//! a time. Both pace themselves with an interruptible delay and end with a
//! [`Termination`] that says why:
//!
//! - [`Termination::QuotaReached`]: normal completion
//! - [`Termination::Cancelled`]: this participant's [`CancelSignal`] fired
//! - [`Termination::Stopped`]: the pool was stopped
//!
//! The loops are plain futures; the roster decides where they run.

use crate::cancel::CancelSignal;
use crate::pool::{IssueOutcome, TicketPool, WithdrawOutcome};
use crate::sales::{Sale, SalesLedger};
use std::sync::Arc;
use std::time::Duration;
use ticket_market_core::{
    Clock, CustomerParams, MarketEvent, ParticipantId, ParticipantInfo, Role, TelemetrySink,
    Termination, Ticket, VendorParams,
};

/// Shared dependencies of every participant in a run.
#[derive(Clone)]
pub struct MarketEnvironment {
    /// The run's pool
    pub pool: Arc<TicketPool>,
    /// Where participants report events
    pub sink: Arc<dyn TelemetrySink>,
    /// Where customers record purchases
    pub ledger: Arc<SalesLedger>,
    /// Timestamps for sales
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MarketEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketEnvironment")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Checked at the top of every iteration. A global stop also cancels every
/// participant, so the stop flag is consulted before the cancel signal.
fn should_end(
    done: u32,
    quota: u32,
    cancel: &CancelSignal,
    pool: &TicketPool,
) -> Option<Termination> {
    if done >= quota {
        Some(Termination::QuotaReached)
    } else if pool.is_stopped() {
        Some(Termination::Stopped)
    } else if cancel.is_cancelled() {
        Some(Termination::Cancelled)
    } else {
        None
    }
}

/// Sleep for `period`, cut short by cancellation or pool stop.
async fn pace(
    period: Duration,
    pool: &TicketPool,
    cancel: &mut CancelSignal,
) -> Option<Termination> {
    if period.is_zero() {
        tokio::task::yield_now().await;
        return None;
    }
    tokio::select! {
        biased;
        () = pool.stopped() => Some(Termination::Stopped),
        () = cancel.cancelled() => Some(Termination::Cancelled),
        () = tokio::time::sleep(period) => None,
    }
}

// ============================================================================
// Vendor
// ============================================================================

/// Releases `batch_size` tickets every `period` until its quota is issued.
#[derive(Debug, Clone)]
pub struct Vendor {
    id: ParticipantId,
    params: VendorParams,
}

impl Vendor {
    /// Create a vendor with a fresh id. `params` should already be validated.
    #[must_use]
    pub fn new(params: VendorParams) -> Self {
        Self {
            id: ParticipantId::new(),
            params,
        }
    }

    /// Unique id
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// Parameters the vendor was created with
    #[must_use]
    pub const fn params(&self) -> &VendorParams {
        &self.params
    }

    /// Identity for roster and telemetry
    #[must_use]
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            name: self.params.name.clone(),
            role: Role::Vendor,
        }
    }

    /// Run the release loop to completion.
    pub async fn run(self, env: MarketEnvironment, mut cancel: CancelSignal) -> Termination {
        let info = self.info();
        env.sink.record(MarketEvent::ParticipantStarted {
            participant: info.clone(),
        });

        let mut issued = 0;
        let termination = self.release(&env, &mut cancel, &mut issued).await;

        env.sink.record(MarketEvent::ParticipantFinished {
            participant: info,
            termination,
            completed: issued,
        });
        termination
    }

    async fn release(
        &self,
        env: &MarketEnvironment,
        cancel: &mut CancelSignal,
        issued: &mut u32,
    ) -> Termination {
        let params = &self.params;

        loop {
            if let Some(end) = should_end(*issued, params.quota, cancel, &env.pool) {
                return end;
            }

            let batch = params.batch_size.min(params.quota - *issued);
            for _ in 0..batch {
                let ticket_id = u64::from(*issued) + 1;
                let ticket =
                    Ticket::new(ticket_id, params.event_name.clone(), params.price, self.id);

                match env.pool.issue(ticket, cancel).await {
                    IssueOutcome::Issued { pool_size } => {
                        *issued += 1;
                        env.sink.record(MarketEvent::TicketIssued {
                            vendor: params.name.clone(),
                            ticket_id,
                            event_name: params.event_name.clone(),
                            pool_size,
                        });
                    }
                    IssueOutcome::Stopped => return Termination::Stopped,
                    IssueOutcome::Cancelled => return Termination::Cancelled,
                }
            }

            if *issued >= params.quota {
                return Termination::QuotaReached;
            }
            if let Some(end) = pace(params.period, &env.pool, cancel).await {
                return end;
            }
        }
    }
}

// ============================================================================
// Customer
// ============================================================================

/// Buys one ticket every `period` until its quota is bought.
#[derive(Debug, Clone)]
pub struct Customer {
    id: ParticipantId,
    params: CustomerParams,
}

impl Customer {
    /// Create a customer with a fresh id. `params` should already be validated.
    #[must_use]
    pub fn new(params: CustomerParams) -> Self {
        Self {
            id: ParticipantId::new(),
            params,
        }
    }

    /// Unique id
    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    /// Parameters the customer was created with
    #[must_use]
    pub const fn params(&self) -> &CustomerParams {
        &self.params
    }

    /// Identity for roster and telemetry
    #[must_use]
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            name: self.params.name.clone(),
            role: Role::Customer,
        }
    }

    /// Run the purchase loop to completion.
    pub async fn run(self, env: MarketEnvironment, mut cancel: CancelSignal) -> Termination {
        let info = self.info();
        env.sink.record(MarketEvent::ParticipantStarted {
            participant: info.clone(),
        });

        let mut bought = 0;
        let termination = self.buy(&env, &mut cancel, &mut bought).await;

        env.sink.record(MarketEvent::ParticipantFinished {
            participant: info,
            termination,
            completed: bought,
        });
        termination
    }

    async fn buy(
        &self,
        env: &MarketEnvironment,
        cancel: &mut CancelSignal,
        bought: &mut u32,
    ) -> Termination {
        let params = &self.params;

        loop {
            if let Some(end) = should_end(*bought, params.quota, cancel, &env.pool) {
                return end;
            }

            match env.pool.withdraw(cancel).await {
                WithdrawOutcome::Withdrawn { ticket, pool_size } => {
                    *bought += 1;
                    env.ledger
                        .record(Sale::new(&ticket, params.name.clone(), env.clock.now()));
                    env.sink.record(MarketEvent::TicketWithdrawn {
                        customer: params.name.clone(),
                        ticket_id: ticket.id(),
                        price: ticket.price(),
                        pool_size,
                    });
                }
                WithdrawOutcome::Drained => return Termination::Stopped,
                WithdrawOutcome::Cancelled => return Termination::Cancelled,
            }

            if *bought >= params.quota {
                return Termination::QuotaReached;
            }
            if let Some(end) = pace(params.period, &env.pool, cancel).await {
                return end;
            }
        }
    }
}
