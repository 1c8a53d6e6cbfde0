//! The bounded ticket pool.
//!
//! [`TicketPool`] is a bounded FIFO buffer shared by every participant of a
//! simulation run. Vendors block in [`issue`](TicketPool::issue) while the pool
//! is full; customers block in [`withdraw`](TicketPool::withdraw) while it is
//! empty. [`request_stop`](TicketPool::request_stop) wakes every blocked caller.
//!
//! # Locking
//!
//! A single `std::sync::Mutex` guards the buffer together with its counters,
//! so issue, withdraw, stop and snapshot never observe each other half-done.
//! The lock is held only for O(1) sections and never across an `.await`.
//!
//! Waiting uses one [`Notify`] with `notify_waiters`, which wakes *all*
//! current waiters. Each waiter enables its `Notified` future before
//! re-checking the condition under the lock, so a notification sent between
//! the check and the wait is not lost.
//!
//! # Wake conditions
//!
//! | Caller   | Proceeds when                         |
//! |----------|---------------------------------------|
//! | issue    | space available, or stop requested    |
//! | withdraw | ticket available, or stop + empty     |
//!
//! After a stop, `withdraw` keeps handing out the remaining tickets until the
//! pool is drained.

use crate::cancel::CancelSignal;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ticket_market_core::{MarketError, MarketEvent, Money, TelemetrySink, Ticket};
use tokio::sync::Notify;

/// Result of [`TicketPool::issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    /// The ticket was appended
    Issued {
        /// Pool occupancy right after the insert
        pool_size: usize,
    },
    /// Stop was requested; the ticket was not enqueued
    Stopped,
    /// The caller was cancelled while waiting for space
    Cancelled,
}

/// Result of [`TicketPool::withdraw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// The head ticket was removed
    Withdrawn {
        /// The ticket
        ticket: Ticket,
        /// Pool occupancy right after the removal
        pool_size: usize,
    },
    /// Stop was requested and the pool is empty
    Drained,
    /// The caller was cancelled while waiting for a ticket
    Cancelled,
}

/// Consistent point-in-time view of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    /// Tickets currently in the pool
    pub current_size: usize,
    /// Maximum tickets the pool holds
    pub capacity: usize,
    /// Tickets ever issued into this pool
    pub total_issued: u64,
    /// Tickets ever withdrawn from this pool
    pub total_withdrawn: u64,
    /// Sum of the prices of all withdrawn tickets
    pub total_revenue: Money,
    /// Whether stop has been requested
    pub stopped: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    tickets: VecDeque<Ticket>,
    total_issued: u64,
    total_withdrawn: u64,
    total_revenue: Money,
    stopped: bool,
}

/// Bounded, stoppable, FIFO ticket buffer.
pub struct TicketPool {
    capacity: usize,
    state: Mutex<PoolState>,
    changed: Notify,
    sink: Arc<dyn TelemetrySink>,
}

impl TicketPool {
    /// Create an empty pool.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize, sink: Arc<dyn TelemetrySink>) -> Result<Self, MarketError> {
        if capacity == 0 {
            return Err(MarketError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            state: Mutex::new(PoolState {
                tickets: VecDeque::with_capacity(capacity),
                ..PoolState::default()
            }),
            changed: Notify::new(),
            sink,
        })
    }

    /// Maximum number of tickets held at once
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    // Poisoning is recovered: no critical section below can panic halfway
    // through a mutation.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a ticket, waiting for space if the pool is full.
    ///
    /// Returns [`IssueOutcome::Stopped`] without enqueueing once stop has been
    /// requested, and [`IssueOutcome::Cancelled`] if `cancel` fires while
    /// waiting.
    pub async fn issue(&self, ticket: Ticket, cancel: &mut CancelSignal) -> IssueOutcome {
        let mut reported_full = false;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.stopped {
                    return IssueOutcome::Stopped;
                }
                if state.tickets.len() < self.capacity {
                    state.tickets.push_back(ticket);
                    state.total_issued += 1;
                    let pool_size = state.tickets.len();
                    drop(state);

                    self.changed.notify_waiters();
                    return IssueOutcome::Issued { pool_size };
                }
            }

            if !reported_full {
                reported_full = true;
                self.sink.record(MarketEvent::PoolFull {
                    capacity: self.capacity,
                });
            }

            // A wake-up that coincides with cancellation is handled first, so
            // a global stop reports Stopped rather than Cancelled.
            tokio::select! {
                biased;
                () = &mut notified => {}
                () = cancel.cancelled() => return IssueOutcome::Cancelled,
            }
        }
    }

    /// Remove the oldest ticket, waiting for one if the pool is empty.
    ///
    /// Returns [`WithdrawOutcome::Drained`] once stop has been requested and
    /// no tickets remain, and [`WithdrawOutcome::Cancelled`] if `cancel`
    /// fires while waiting.
    pub async fn withdraw(&self, cancel: &mut CancelSignal) -> WithdrawOutcome {
        let mut reported_empty = false;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(ticket) = state.tickets.pop_front() {
                    state.total_withdrawn += 1;
                    state.total_revenue = state.total_revenue.saturating_add(ticket.price());
                    let pool_size = state.tickets.len();
                    drop(state);

                    self.changed.notify_waiters();
                    return WithdrawOutcome::Withdrawn { ticket, pool_size };
                }
                if state.stopped {
                    return WithdrawOutcome::Drained;
                }
            }

            if !reported_empty {
                reported_empty = true;
                self.sink.record(MarketEvent::PoolEmpty);
            }

            tokio::select! {
                biased;
                () = &mut notified => {}
                () = cancel.cancelled() => return WithdrawOutcome::Cancelled,
            }
        }
    }

    /// Set the stop flag and wake every waiter.
    ///
    /// Idempotent. Returns `true` only for the call that actually stopped the
    /// pool.
    pub fn request_stop(&self) -> bool {
        let first = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.stopped, true)
        };

        self.changed.notify_waiters();
        if first {
            self.sink.record(MarketEvent::StopRequested);
        }
        first
    }

    /// Whether stop has been requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Completes once stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Consistent view of occupancy and counters
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            current_size: state.tickets.len(),
            capacity: self.capacity,
            total_issued: state.total_issued,
            total_withdrawn: state.total_withdrawn,
            total_revenue: state.total_revenue,
            stopped: state.stopped,
        }
    }
}

impl std::fmt::Debug for TicketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketPool")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use std::time::Duration;
    use ticket_market_core::{NoopSink, ParticipantId};

    fn pool(capacity: usize) -> TicketPool {
        TicketPool::new(capacity, Arc::new(NoopSink)).unwrap()
    }

    fn ticket(id: u64, cents: u64) -> Ticket {
        Ticket::new(id, "Gig", Money::from_cents(cents), ParticipantId::new())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = TicketPool::new(0, Arc::new(NoopSink)).unwrap_err();
        assert_eq!(err, MarketError::InvalidCapacity);
    }

    #[tokio::test]
    async fn issue_then_withdraw_is_fifo() {
        let pool = pool(3);
        let (_handle, mut signal) = cancel_pair();

        for (size, id) in (1..=3).enumerate() {
            let outcome = pool.issue(ticket(id, 100), &mut signal).await;
            assert_eq!(outcome, IssueOutcome::Issued { pool_size: size + 1 });
        }

        for id in 1..=3 {
            match pool.withdraw(&mut signal).await {
                WithdrawOutcome::Withdrawn { ticket, .. } => assert_eq!(ticket.id(), id),
                other => panic!("unexpected {other:?}"),
            }
        }

        let snap = pool.snapshot();
        assert_eq!(snap.current_size, 0);
        assert_eq!(snap.total_issued, 3);
        assert_eq!(snap.total_withdrawn, 3);
        assert_eq!(snap.total_revenue, Money::from_cents(300));
    }

    #[tokio::test]
    async fn issue_after_stop_does_not_enqueue() {
        let pool = pool(2);
        let (_handle, mut signal) = cancel_pair();

        assert!(pool.request_stop());
        assert!(!pool.request_stop());

        assert_eq!(pool.issue(ticket(1, 100), &mut signal).await, IssueOutcome::Stopped);
        assert_eq!(pool.snapshot().total_issued, 0);
    }

    #[tokio::test]
    async fn withdraw_drains_after_stop() {
        let pool = pool(2);
        let (_handle, mut signal) = cancel_pair();
        pool.issue(ticket(1, 250), &mut signal).await;
        pool.request_stop();

        assert!(matches!(
            pool.withdraw(&mut signal).await,
            WithdrawOutcome::Withdrawn { .. }
        ));
        assert_eq!(pool.withdraw(&mut signal).await, WithdrawOutcome::Drained);
        assert_eq!(pool.snapshot().total_revenue, Money::from_cents(250));
    }

    #[tokio::test]
    async fn cancel_aborts_blocked_issue() {
        let pool = Arc::new(pool(1));
        let (_h, mut filler) = cancel_pair();
        pool.issue(ticket(1, 100), &mut filler).await;

        let (handle, mut signal) = cancel_pair();
        let blocked = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.issue(ticket(2, 100), &mut signal).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        handle.cancel();

        let outcome = tokio::time::timeout(Duration::from_millis(100), blocked)
            .await
            .expect("issue should abort promptly")
            .unwrap();
        assert_eq!(outcome, IssueOutcome::Cancelled);
        assert_eq!(pool.snapshot().current_size, 1);
    }

    #[tokio::test]
    async fn cancel_aborts_blocked_withdraw() {
        let pool = Arc::new(pool(1));
        let (handle, mut signal) = cancel_pair();
        let blocked = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.withdraw(&mut signal).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let outcome = tokio::time::timeout(Duration::from_millis(100), blocked)
            .await
            .expect("withdraw should abort promptly")
            .unwrap();
        assert_eq!(outcome, WithdrawOutcome::Cancelled);
    }

    #[tokio::test]
    async fn stopped_future_completes_on_stop() {
        let pool = Arc::new(pool(1));
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.stopped().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.request_stop();

        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("stopped() should resolve")
            .unwrap();
    }
}
