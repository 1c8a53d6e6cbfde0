//! The marketplace orchestrator.
//!
//! [`Marketplace`] is the control surface of the simulator. It owns at most
//! one running simulation: a [`TicketPool`], the [`SalesLedger`] for that run
//! and a [`Roster`] of participant tasks.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start--> Running --stop--> Idle
//! ```
//!
//! Participants can only be added while running. `stop` first detaches the
//! run from the marketplace under the lock, so no participant can be added
//! to a run that is shutting down, and then stops the pool and joins every
//! task outside the lock.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ticket_market_core::{CustomerParams, Money, VendorParams};
//! use ticket_market_runtime::{Marketplace, MarketplaceConfig, TracingSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let market = Marketplace::new(MarketplaceConfig::default(), Arc::new(TracingSink));
//! market.start(10)?;
//! market.add_vendor(VendorParams::new("Vendor 0", "movie", 3, 1, 9, Money::from_cents(1250)))?;
//! market.add_customer(CustomerParams::new("Customer 0", 1, 9))?;
//!
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! let report = market.stop().await?;
//! println!("revenue: {}", report.final_snapshot.total_revenue);
//! # Ok(())
//! # }
//! ```

use crate::cancel::{CancelSignal, cancel_pair};
use crate::metrics::MarketMetrics;
use crate::participant::{Customer, MarketEnvironment, Vendor};
use crate::pool::{PoolSnapshot, TicketPool};
use crate::roster::{ParticipantExit, Roster, RosterEntry, UnitExit};
use crate::sales::{Sale, SalesLedger};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use ticket_market_core::{
    Clock, CustomerParams, MarketConfig, MarketError, MarketEvent, Money, ParticipantId,
    ParticipantInfo, Role, SystemClock, TelemetrySink, Termination, VendorParams,
};

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketplaceConfig {
    /// How long `stop` and `remove_*` wait for a task before aborting it
    pub shutdown_timeout: Duration,
    /// Maximum sales kept in the per-run ledger
    pub sales_history: usize,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
            sales_history: 1000,
        }
    }
}

impl MarketplaceConfig {
    /// Set the per-task shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the sales ledger size
    #[must_use]
    pub const fn with_sales_history(mut self, size: usize) -> Self {
        self.sales_history = size;
        self
    }
}

impl From<&MarketConfig> for MarketplaceConfig {
    fn from(config: &MarketConfig) -> Self {
        Self {
            shutdown_timeout: config.shutdown_timeout(),
            sales_history: config.sales_history,
        }
    }
}

/// Aggregate view returned by [`Marketplace::status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarketStatus {
    /// Whether a simulation is running
    pub running: bool,
    /// Tickets currently in the pool
    pub current_size: usize,
    /// Pool capacity (0 before the first run)
    pub capacity: usize,
    /// Tickets issued in the current or last run
    pub total_issued: u64,
    /// Tickets withdrawn in the current or last run
    pub total_withdrawn: u64,
    /// Revenue of the current or last run
    pub total_revenue: Money,
    /// Vendors whose task is still running
    pub active_vendors: usize,
    /// Customers whose task is still running
    pub active_customers: usize,
}

/// Result of [`Marketplace::remove_vendor`] / [`Marketplace::remove_customer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The participant was cancelled and joined
    Removed(ParticipantExit),
    /// No active participant of that role has that name
    NotFound,
}

/// Outcome of [`Marketplace::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// How each participant that was still registered ended, preceded by
    /// the ones that panicked earlier in the run
    pub exits: Vec<ParticipantExit>,
    /// How many of them had to be aborted
    pub aborted: usize,
    /// Pool counters after every task was joined
    pub final_snapshot: PoolSnapshot,
    /// Time taken to stop
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)] // signature required by serde
    pub fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}

struct ActiveRun {
    env: MarketEnvironment,
    roster: Roster,
    /// Abnormal exits reaped while the run was live
    failed: Vec<ParticipantExit>,
    /// Each in-flight removal holds a read guard; stop takes the write lock
    removals: Arc<RwLock<()>>,
}

impl ActiveRun {
    fn reap(&mut self, sink: &dyn TelemetrySink) {
        let reaped = self.roster.prune_finished(sink);
        self.failed.extend(reaped.into_iter().filter(|exit| !exit.exit.is_normal()));
    }
}

/// What an idle marketplace still knows about its last run.
struct FinishedRun {
    pool: Arc<TicketPool>,
    ledger: Arc<SalesLedger>,
}

enum Phase {
    Idle(Option<FinishedRun>),
    Running(ActiveRun),
}

/// Starts, populates, inspects and stops ticket market simulations.
///
/// All methods take `&self`; share the marketplace behind an `Arc`.
/// Participant-adding methods spawn tasks and must be called from within a
/// Tokio runtime. Dropping a running marketplace cancels its participants.
pub struct Marketplace {
    config: MarketplaceConfig,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    phase: Mutex<Phase>,
}

impl Marketplace {
    /// Create an idle marketplace using the system clock.
    #[must_use]
    pub fn new(config: MarketplaceConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        Self::with_clock(config, sink, Arc::new(SystemClock))
    }

    /// Create an idle marketplace with an explicit clock for sale timestamps.
    #[must_use]
    pub fn with_clock(
        config: MarketplaceConfig,
        sink: Arc<dyn TelemetrySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            sink,
            clock,
            phase: Mutex::new(Phase::Idle(None)),
        }
    }

    /// Orchestrator settings
    #[must_use]
    pub const fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a simulation with a fresh pool of `capacity` tickets.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidCapacity`] if `capacity` is zero
    /// - [`MarketError::AlreadyRunning`] if a simulation is running
    #[tracing::instrument(skip(self))]
    pub fn start(&self, capacity: usize) -> Result<(), MarketError> {
        let mut phase = self.lock();
        if matches!(*phase, Phase::Running(_)) {
            return Err(MarketError::AlreadyRunning);
        }

        let pool = TicketPool::new(capacity, Arc::clone(&self.sink))?;
        *phase = Phase::Running(ActiveRun {
            env: MarketEnvironment {
                pool: Arc::new(pool),
                sink: Arc::clone(&self.sink),
                ledger: Arc::new(SalesLedger::new(self.config.sales_history)),
                clock: Arc::clone(&self.clock),
            },
            roster: Roster::new(),
            failed: Vec::new(),
            removals: Arc::new(RwLock::new(())),
        });
        drop(phase);

        self.sink.record(MarketEvent::SimulationStarted { capacity });
        Ok(())
    }

    /// Validate `params` and spawn a vendor task.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidParameter`] if `params` fail validation
    /// - [`MarketError::NotRunning`] if no simulation is running
    /// - [`MarketError::DuplicateParticipant`] if an active vendor has the
    ///   same name
    pub fn add_vendor(&self, params: VendorParams) -> Result<ParticipantId, MarketError> {
        params.validate()?;
        let vendor = Vendor::new(params);
        let info = vendor.info();
        self.register(info, |env, signal| vendor.run(env, signal))
    }

    /// Validate `params` and spawn a customer task.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidParameter`] if `params` fail validation
    /// - [`MarketError::NotRunning`] if no simulation is running
    /// - [`MarketError::DuplicateParticipant`] if an active customer has the
    ///   same name
    pub fn add_customer(&self, params: CustomerParams) -> Result<ParticipantId, MarketError> {
        params.validate()?;
        let customer = Customer::new(params);
        let info = customer.info();
        self.register(info, |env, signal| customer.run(env, signal))
    }

    // Runs entirely under the phase lock so it cannot interleave with stop.
    fn register<F, Fut>(
        &self,
        info: ParticipantInfo,
        run: F,
    ) -> Result<ParticipantId, MarketError>
    where
        F: FnOnce(MarketEnvironment, CancelSignal) -> Fut,
        Fut: Future<Output = Termination> + Send + 'static,
    {
        let mut phase = self.lock();
        let Phase::Running(active) = &mut *phase else {
            return Err(MarketError::NotRunning);
        };

        active.reap(self.sink.as_ref());
        active.roster.ensure_available(info.role, &info.name)?;

        let id = info.id;
        let (handle, signal) = cancel_pair();
        let future = run(active.env.clone(), signal);
        active.roster.insert(RosterEntry::spawn(info, handle, future))?;
        Ok(id)
    }

    /// Cancel and join the vendor named `name` (trimmed, case-insensitive).
    pub async fn remove_vendor(&self, name: &str) -> Removal {
        self.remove(Role::Vendor, name).await
    }

    /// Cancel and join the customer named `name` (trimmed, case-insensitive).
    pub async fn remove_customer(&self, name: &str) -> Removal {
        self.remove(Role::Customer, name).await
    }

    async fn remove(&self, role: Role, name: &str) -> Removal {
        let entry = {
            let mut phase = self.lock();
            match &mut *phase {
                Phase::Running(active) => active.roster.remove(role, name).map(|entry| {
                    // Only stop takes the write lock, and only after leaving
                    // the running phase.
                    let guard = Arc::clone(&active.removals).try_read_owned().ok();
                    (entry, guard)
                }),
                Phase::Idle(_) => None,
            }
        };

        match entry {
            Some((entry, _removal)) => {
                let exit = entry
                    .shutdown(self.config.shutdown_timeout, self.sink.as_ref())
                    .await;
                tracing::info!(name = %exit.participant.name, %role, "Participant removed");
                Removal::Removed(exit)
            }
            None => {
                tracing::debug!(%name, %role, "No active participant to remove");
                Removal::NotFound
            }
        }
    }

    /// Stop the running simulation and join every participant.
    ///
    /// Sets the pool's stop flag, cancels every task, and waits up to the
    /// shutdown timeout for each; stragglers are aborted. Removals already in
    /// progress are waited for as well. The marketplace is idle (and can be
    /// restarted) as soon as this is called.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotRunning`] if no simulation is running.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<StopReport, MarketError> {
        let started = Instant::now();

        let ActiveRun {
            env,
            mut roster,
            mut failed,
            removals,
        } = {
            let mut phase = self.lock();
            let Phase::Running(active) = &*phase else {
                return Err(MarketError::NotRunning);
            };
            let finished = FinishedRun {
                pool: Arc::clone(&active.env.pool),
                ledger: Arc::clone(&active.env.ledger),
            };
            match std::mem::replace(&mut *phase, Phase::Idle(Some(finished))) {
                Phase::Running(active) => active,
                Phase::Idle(_) => return Err(MarketError::NotRunning),
            }
        };

        env.pool.request_stop();

        let timeout = self.config.shutdown_timeout;
        let sink = self.sink.as_ref();
        let joined = futures::future::join_all(
            roster
                .drain()
                .into_iter()
                .map(|entry| entry.shutdown(timeout, sink)),
        )
        .await;
        drop(removals.write().await);

        failed.extend(joined);
        let exits = failed;

        let aborted = exits
            .iter()
            .filter(|exit| exit.exit == UnitExit::Aborted)
            .count();
        let final_snapshot = env.pool.snapshot();
        let duration = started.elapsed();

        MarketMetrics::record_stop(duration);
        self.sink.record(MarketEvent::SimulationStopped {
            total_issued: final_snapshot.total_issued,
            total_revenue: final_snapshot.total_revenue,
        });
        if aborted > 0 {
            tracing::warn!(aborted, "Some participants had to be aborted");
        }

        Ok(StopReport {
            exits,
            aborted,
            final_snapshot,
            duration,
        })
    }

    /// Whether a simulation is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), Phase::Running(_))
    }

    /// Aggregate status.
    ///
    /// Finished participant tasks are pruned first, so the active counts only
    /// include tasks that are still running. Pruning reports panicked tasks
    /// to the telemetry sink. While idle, the pool counters are
    /// those of the last run (all zeros before the first run).
    #[must_use]
    pub fn status(&self) -> MarketStatus {
        let mut phase = self.lock();
        let (running, snapshot, active_vendors, active_customers) = match &mut *phase {
            Phase::Running(active) => {
                active.reap(self.sink.as_ref());
                (
                    true,
                    active.env.pool.snapshot(),
                    active.roster.count(Role::Vendor),
                    active.roster.count(Role::Customer),
                )
            }
            Phase::Idle(Some(last)) => (false, last.pool.snapshot(), 0, 0),
            Phase::Idle(None) => (false, PoolSnapshot::default(), 0, 0),
        };

        MarketStatus {
            running,
            current_size: snapshot.current_size,
            capacity: snapshot.capacity,
            total_issued: snapshot.total_issued,
            total_withdrawn: snapshot.total_withdrawn,
            total_revenue: snapshot.total_revenue,
            active_vendors,
            active_customers,
        }
    }

    /// Pool snapshot of the current or last run
    #[must_use]
    pub fn ticket_status(&self) -> PoolSnapshot {
        match &*self.lock() {
            Phase::Running(active) => active.env.pool.snapshot(),
            Phase::Idle(Some(last)) => last.pool.snapshot(),
            Phase::Idle(None) => PoolSnapshot::default(),
        }
    }

    /// Revenue of the current or last run
    #[must_use]
    pub fn sales_total(&self) -> Money {
        self.ticket_status().total_revenue
    }

    /// The newest `limit` sales of the current or last run, oldest first
    #[must_use]
    pub fn sales(&self, limit: usize) -> Vec<Sale> {
        match &*self.lock() {
            Phase::Running(active) => active.env.ledger.recent(limit),
            Phase::Idle(Some(last)) => last.ledger.recent(limit),
            Phase::Idle(None) => Vec::new(),
        }
    }

    /// Identities of the registered participants of the running simulation
    #[must_use]
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        match &*self.lock() {
            Phase::Running(active) => active.roster.participants(),
            Phase::Idle(_) => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
