//! Registry of running participant tasks.
//!
//! The [`Roster`] owns, for every live participant, the task handle and the
//! [`CancelHandle`] that can end it. Entries are keyed per role by the
//! normalized (trimmed, lowercased) name, so names are unique within a role
//! and lookups are case-insensitive.
//!
//! The roster itself is plain data; the marketplace guards it with its own
//! lock and never awaits while holding it. Joining a running task happens
//! after the entry has been taken out, through [`RosterEntry::shutdown`];
//! tasks that already returned are reaped in place by
//! [`Roster::prune_finished`].

use crate::cancel::CancelHandle;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use ticket_market_core::participant::normalize_name;
use ticket_market_core::{
    MarketError, MarketEvent, ParticipantInfo, Role, TelemetrySink, Termination,
};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

/// How a participant task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum UnitExit {
    /// The loop returned normally
    Finished(Termination),
    /// The task did not exit within the shutdown timeout and was aborted
    Aborted,
    /// The task panicked
    Panicked(String),
}

impl UnitExit {
    fn from_join(joined: Result<Termination, JoinError>) -> Self {
        match joined {
            Ok(termination) => Self::Finished(termination),
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Self::Panicked(message)
            }
            Err(_) => Self::Aborted,
        }
    }

    /// Whether the loop returned on its own
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// A participant and how its task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantExit {
    /// Who
    pub participant: ParticipantInfo,
    /// How
    pub exit: UnitExit,
}

// Aborts are reported where they happen, in `RosterEntry::shutdown`.
fn report_panic(exit: &ParticipantExit, sink: &dyn TelemetrySink) {
    if let UnitExit::Panicked(message) = &exit.exit {
        sink.record(MarketEvent::ParticipantPanicked {
            participant: exit.participant.clone(),
            message: message.clone(),
        });
    }
}

/// A live participant task.
#[derive(Debug)]
pub struct RosterEntry {
    info: ParticipantInfo,
    cancel: CancelHandle,
    task: JoinHandle<Termination>,
}

impl RosterEntry {
    /// Spawn `future` on the current runtime inside a span naming the
    /// participant.
    pub fn spawn<F>(info: ParticipantInfo, cancel: CancelHandle, future: F) -> Self
    where
        F: Future<Output = Termination> + Send + 'static,
    {
        let span = tracing::info_span!(
            "participant",
            name = %info.name,
            role = %info.role,
            id = %info.id,
        );
        Self {
            info,
            cancel,
            task: tokio::spawn(future.instrument(span)),
        }
    }

    /// Participant identity
    #[must_use]
    pub const fn info(&self) -> &ParticipantInfo {
        &self.info
    }

    /// Whether the task has already returned
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task, wait up to `timeout` for it, abort it if it is
    /// still running.
    pub async fn shutdown(self, timeout: Duration, sink: &dyn TelemetrySink) -> ParticipantExit {
        let Self {
            info,
            cancel,
            mut task,
        } = self;
        cancel.cancel();

        let exit = match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => UnitExit::from_join(joined),
            Err(_elapsed) => {
                task.abort();
                sink.record(MarketEvent::ParticipantAborted {
                    participant: info.clone(),
                });
                UnitExit::Aborted
            }
        };

        let exit = ParticipantExit {
            participant: info,
            exit,
        };
        report_panic(&exit, sink);
        exit
    }

    /// Join a task that has already returned, without waiting. Hands the
    /// entry back if the task is still running.
    fn try_reap(self) -> Result<ParticipantExit, Self> {
        let Self {
            info,
            cancel,
            mut task,
        } = self;
        match (&mut task).now_or_never() {
            Some(joined) => Ok(ParticipantExit {
                participant: info,
                exit: UnitExit::from_join(joined),
            }),
            None => Err(Self { info, cancel, task }),
        }
    }
}

/// Live participant tasks grouped by role.
#[derive(Debug, Default)]
pub struct Roster {
    vendors: HashMap<String, RosterEntry>,
    customers: HashMap<String, RosterEntry>,
}

impl Roster {
    /// Create an empty roster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, role: Role) -> &HashMap<String, RosterEntry> {
        match role {
            Role::Vendor => &self.vendors,
            Role::Customer => &self.customers,
        }
    }

    fn group_mut(&mut self, role: Role) -> &mut HashMap<String, RosterEntry> {
        match role {
            Role::Vendor => &mut self.vendors,
            Role::Customer => &mut self.customers,
        }
    }

    /// Whether a participant named `name` is registered in `role`
    #[must_use]
    pub fn contains(&self, role: Role, name: &str) -> bool {
        self.group(role).contains_key(&normalize_name(name))
    }

    /// Fail if `name` is already taken in `role`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::DuplicateParticipant`] if the name is taken.
    pub fn ensure_available(&self, role: Role, name: &str) -> Result<(), MarketError> {
        if self.contains(role, name) {
            return Err(MarketError::DuplicateParticipant {
                role: role.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Register a spawned entry.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::DuplicateParticipant`] if the name is taken.
    /// The rejected entry is dropped, which cancels its task.
    pub fn insert(&mut self, entry: RosterEntry) -> Result<(), MarketError> {
        let role = entry.info.role;
        self.ensure_available(role, &entry.info.name)?;
        let key = normalize_name(&entry.info.name);
        self.group_mut(role).insert(key, entry);
        Ok(())
    }

    /// Take the entry named `name` out of `role`, if present
    pub fn remove(&mut self, role: Role, name: &str) -> Option<RosterEntry> {
        self.group_mut(role).remove(&normalize_name(name))
    }

    /// Take out and join every entry whose task has already returned.
    ///
    /// Panicked tasks are reported to `sink`. Returns every reaped exit.
    pub fn prune_finished(&mut self, sink: &dyn TelemetrySink) -> Vec<ParticipantExit> {
        let mut exits = Vec::new();
        for group in [&mut self.vendors, &mut self.customers] {
            let finished: Vec<String> = group
                .iter()
                .filter(|(_, entry)| entry.is_finished())
                .map(|(key, _)| key.clone())
                .collect();
            for key in finished {
                let Some(entry) = group.remove(&key) else {
                    continue;
                };
                match entry.try_reap() {
                    Ok(exit) => {
                        report_panic(&exit, sink);
                        exits.push(exit);
                    }
                    Err(entry) => {
                        group.insert(key, entry);
                    }
                }
            }
        }
        exits
    }

    /// Number of entries in `role`
    #[must_use]
    pub fn count(&self, role: Role) -> usize {
        self.group(role).len()
    }

    /// Total entries across both roles
    #[must_use]
    pub fn len(&self) -> usize {
        self.vendors.len() + self.customers.len()
    }

    /// Check if the roster is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every registered task has returned
    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.vendors
            .values()
            .chain(self.customers.values())
            .all(RosterEntry::is_finished)
    }

    /// Identities of all registered participants, vendors first
    #[must_use]
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.vendors
            .values()
            .chain(self.customers.values())
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Take every entry out, leaving the roster empty
    pub fn drain(&mut self) -> Vec<RosterEntry> {
        self.vendors
            .drain()
            .chain(self.customers.drain())
            .map(|(_, entry)| entry)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use ticket_market_core::{NoopSink, ParticipantId};
    use ticket_market_testing::{RecordingSink, eventually};

    fn info(name: &str, role: Role) -> ParticipantInfo {
        ParticipantInfo {
            id: ParticipantId::new(),
            name: name.to_string(),
            role,
        }
    }

    fn waiting_entry(name: &str, role: Role) -> RosterEntry {
        let (handle, mut signal) = cancel_pair();
        RosterEntry::spawn(info(name, role), handle, async move {
            signal.cancelled().await;
            Termination::Cancelled
        })
    }

    #[tokio::test]
    async fn names_are_unique_per_role_case_insensitively() {
        let mut roster = Roster::new();
        roster.insert(waiting_entry("Alice", Role::Vendor)).unwrap();

        let err = roster
            .insert(waiting_entry("  alice ", Role::Vendor))
            .unwrap_err();
        assert!(matches!(err, MarketError::DuplicateParticipant { .. }));

        roster.insert(waiting_entry("ALICE", Role::Customer)).unwrap();
        assert_eq!(roster.count(Role::Vendor), 1);
        assert_eq!(roster.count(Role::Customer), 1);
    }

    #[tokio::test]
    async fn remove_matches_trimmed_lowercase() {
        let mut roster = Roster::new();
        roster.insert(waiting_entry("Vendor 0", Role::Vendor)).unwrap();

        assert!(roster.remove(Role::Customer, "Vendor 0").is_none());
        let entry = roster.remove(Role::Vendor, " vendor 0 ").unwrap();
        assert_eq!(entry.info().name, "Vendor 0");
        assert!(roster.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_and_joins() {
        let entry = waiting_entry("C", Role::Customer);
        let exit = entry.shutdown(Duration::from_secs(1), &NoopSink).await;
        assert_eq!(exit.exit, UnitExit::Finished(Termination::Cancelled));
    }

    #[tokio::test]
    async fn shutdown_aborts_stuck_task() {
        let (handle, _signal) = cancel_pair();
        let entry = RosterEntry::spawn(info("Stuck", Role::Vendor), handle, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Termination::QuotaReached
        });

        let exit = entry.shutdown(Duration::from_millis(20), &NoopSink).await;
        assert_eq!(exit.exit, UnitExit::Aborted);
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let (handle, _signal) = cancel_pair();
        let entry = RosterEntry::spawn(info("Boom", Role::Vendor), handle, async {
            let fail = true;
            if fail {
                panic!("boom");
            }
            Termination::QuotaReached
        });

        let sink = RecordingSink::new();
        let exit = entry.shutdown(Duration::from_secs(1), &sink).await;
        assert_eq!(exit.exit, UnitExit::Panicked("boom".to_string()));
        assert_eq!(sink.count("participant_panicked"), 1);
    }

    #[tokio::test]
    async fn prune_reports_panicked_entries() {
        let mut roster = Roster::new();
        let (handle, _signal) = cancel_pair();
        roster
            .insert(RosterEntry::spawn(info("Boom", Role::Customer), handle, async {
                let fail = true;
                if fail {
                    panic!("sold out of luck");
                }
                Termination::QuotaReached
            }))
            .unwrap();

        let sink = RecordingSink::new();
        let mut exits = Vec::new();
        assert!(
            eventually(Duration::from_secs(1), || {
                exits.extend(roster.prune_finished(&sink));
                roster.is_empty()
            })
            .await
        );

        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].exit, UnitExit::Panicked("sold out of luck".to_string()));
        assert!(!exits[0].exit.is_normal());
        assert!(sink.events().iter().any(|event| matches!(
            event,
            MarketEvent::ParticipantPanicked { participant, message }
                if participant.name == "Boom" && message == "sold out of luck"
        )));

        // Reaped entries are gone, so nothing is reported twice.
        assert!(roster.prune_finished(&sink).is_empty());
        assert_eq!(sink.count("participant_panicked"), 1);
    }

    #[tokio::test]
    async fn prune_drops_finished_entries() {
        let mut roster = Roster::new();
        let (handle, _signal) = cancel_pair();
        roster
            .insert(RosterEntry::spawn(info("Quick", Role::Vendor), handle, async {
                Termination::QuotaReached
            }))
            .unwrap();
        roster.insert(waiting_entry("Slow", Role::Customer)).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let exits = roster.prune_finished(&NoopSink);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].participant.name, "Quick");
        assert_eq!(exits[0].exit, UnitExit::Finished(Termination::QuotaReached));
        assert_eq!(roster.count(Role::Vendor), 0);
        assert_eq!(roster.count(Role::Customer), 1);
        assert!(!roster.all_finished());

        for entry in roster.drain() {
            entry.shutdown(Duration::from_secs(1), &NoopSink).await;
        }
    }
}
