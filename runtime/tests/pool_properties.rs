//! Integration tests for the bounded ticket pool
//!
//! Covers capacity bounds, counter accounting, stop waking every blocked
//! caller, and draining after stop.

// Test code can use unwrap/expect/panic
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use ticket_market_core::{Money, NoopSink};
use ticket_market_runtime::{IssueOutcome, TicketPool, WithdrawOutcome, cancel_pair};
use ticket_market_testing::{RecordingSink, ticket, within};

// ============================================================================
// Test Fixtures
// ============================================================================

fn pool(capacity: usize) -> Arc<TicketPool> {
    Arc::new(TicketPool::new(capacity, Arc::new(NoopSink)).unwrap())
}

#[derive(Debug, Clone)]
enum Op {
    Issue(u64),
    Withdraw,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..10_000).prop_map(Op::Issue),
        Just(Op::Withdraw),
    ]
}

// ============================================================================
// Tests
// ============================================================================

proptest! {
    #[test]
    fn counters_match_a_fifo_model(
        capacity in 1usize..6,
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let pool = pool(capacity);
        let (_handle, mut signal) = cancel_pair();
        let mut model: VecDeque<(u64, u64)> = VecDeque::new();
        let mut issued = 0u64;
        let mut withdrawn = 0u64;
        let mut revenue = 0u64;

        tokio_test::block_on(async {
            for (id, op) in (1u64..).zip(ops) {
                match op {
                    // Only issue/withdraw when it cannot block.
                    Op::Issue(cents) if model.len() < capacity => {
                        let outcome = pool.issue(ticket(id, cents), &mut signal).await;
                        model.push_back((id, cents));
                        issued += 1;
                        prop_assert_eq!(outcome, IssueOutcome::Issued { pool_size: model.len() });
                    }
                    Op::Withdraw if !model.is_empty() => {
                        let (expected_id, cents) = model.pop_front().unwrap();
                        match pool.withdraw(&mut signal).await {
                            WithdrawOutcome::Withdrawn { ticket, pool_size } => {
                                prop_assert_eq!(ticket.id(), expected_id);
                                prop_assert_eq!(pool_size, model.len());
                            }
                            other => prop_assert!(false, "unexpected {:?}", other),
                        }
                        withdrawn += 1;
                        revenue += cents;
                    }
                    _ => {}
                }

                let snap = pool.snapshot();
                prop_assert!(snap.current_size <= snap.capacity);
                prop_assert_eq!(snap.current_size, model.len());
                prop_assert_eq!(snap.total_issued, issued);
                prop_assert_eq!(snap.total_withdrawn, withdrawn);
                prop_assert_eq!(snap.total_revenue, Money::from_cents(revenue));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_wakes_blocked_issuer() {
    let pool = pool(1);
    let (_h, mut filler) = cancel_pair();
    pool.issue(ticket(1, 100), &mut filler).await;

    let blocked = {
        let pool = Arc::clone(&pool);
        let (handle, mut signal) = cancel_pair();
        tokio::spawn(async move {
            let _keep = handle;
            pool.issue(ticket(2, 100), &mut signal).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    assert!(pool.request_stop());

    let outcome = within(Duration::from_millis(100), blocked)
        .await
        .expect("blocked issue should return within 100ms")
        .unwrap();
    assert_eq!(outcome, IssueOutcome::Stopped);
    assert_eq!(pool.snapshot().current_size, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_wakes_every_blocked_withdrawer() {
    let pool = pool(1);

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let (handle, mut signal) = cancel_pair();
            tokio::spawn(async move {
                let _keep = handle;
                pool.withdraw(&mut signal).await
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.request_stop();

    for waiter in waiters {
        let outcome = within(Duration::from_millis(100), waiter)
            .await
            .expect("blocked withdraw should return within 100ms")
            .unwrap();
        assert_eq!(outcome, WithdrawOutcome::Drained);
    }
}

#[tokio::test]
async fn remaining_tickets_drain_after_stop() {
    let pool = pool(3);
    let (_handle, mut signal) = cancel_pair();
    for id in 1..=3 {
        pool.issue(ticket(id, 500), &mut signal).await;
    }
    pool.request_stop();

    let mut drained = Vec::new();
    while let WithdrawOutcome::Withdrawn { ticket, .. } = pool.withdraw(&mut signal).await {
        drained.push(ticket.id());
    }

    assert_eq!(drained, vec![1, 2, 3]);
    assert_eq!(pool.snapshot().total_revenue, Money::from_cents(1500));
}

#[tokio::test]
async fn blocked_calls_report_full_and_empty_once() {
    let sink = Arc::new(RecordingSink::new());
    let pool = Arc::new(TicketPool::new(1, sink.clone()).unwrap());

    let (empty_handle, mut empty_signal) = cancel_pair();
    let withdrawer = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.withdraw(&mut empty_signal).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    empty_handle.cancel();
    assert_eq!(withdrawer.await.unwrap(), WithdrawOutcome::Cancelled);

    let (_h, mut signal) = cancel_pair();
    pool.issue(ticket(1, 100), &mut signal).await;

    let (full_handle, mut full_signal) = cancel_pair();
    let issuer = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.issue(ticket(2, 100), &mut full_signal).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    full_handle.cancel();
    assert_eq!(issuer.await.unwrap(), IssueOutcome::Cancelled);

    assert_eq!(sink.count("pool_empty"), 1);
    assert_eq!(sink.count("pool_full"), 1);
}

#[tokio::test]
async fn repeated_stop_emits_one_event() {
    let sink = Arc::new(RecordingSink::new());
    let pool = TicketPool::new(2, sink.clone()).unwrap();

    assert!(pool.request_stop());
    assert!(!pool.request_stop());
    assert!(!pool.request_stop());

    assert_eq!(sink.count("stop_requested"), 1);
    assert!(pool.snapshot().stopped);
}
