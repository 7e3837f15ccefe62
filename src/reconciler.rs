// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The reconciliation loop.
//!
//! One tick maps the current replica-set status and the current pod roster
//! to a decision: initialize, join new members, evict unhealthy members,
//! force reconfiguration, or do nothing. Every pod of the workload runs this loop
//! concurrently; safety comes from the deterministic election (all replicas
//! observing the same roster select the same actor) and from mutations that
//! are idempotent at the database layer.
//!
//! The decision itself is computed by the pure planner functions
//! ([`plan_in_set`], [`plan_initiation`], [`plan_invalid_set`]), which map
//! the classified status, the roster, and the host identity to a
//! [`TickAction`]. The async driver only gathers their inputs and executes
//! the planned action against the database session.
//!
//! Ticks are strictly serial within one process: the next tick is armed only
//! after the previous tick's finalize ran. Each tick is a fresh observation;
//! no state persists between ticks except the immutable [`HostIdentity`] and
//! static configuration. No error is retried within a tick; the next tick
//! re-observes reality.

use crate::config::Config;
use crate::constants::LOCAL_MONGO_HOST;
use crate::diff;
use crate::election;
use crate::errors::Error;
use crate::host::HostIdentity;
use crate::metrics;
use crate::mongo::{self, ReplSetMember, ReplSetSession, ReplSetStatus, StatusOutcome};
use crate::pods::{self, PeerPod};
use mongodb::bson::DateTime;
use std::net::Ipv4Addr;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What one tick did.
///
/// Not persisted; logged at the finalize boundary and counted in metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do this tick
    NoOp,
    /// This pod initialized the replica set
    Initialized,
    /// Membership was reconfigured by the acting primary
    Reconfigured,
    /// Membership was force-reconfigured without a primary
    ForcedReconfigured,
}

impl TickOutcome {
    /// Metrics/label form of the outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::Initialized => "initialized",
            Self::Reconfigured => "reconfigured",
            Self::ForcedReconfigured => "forced_reconfigured",
        }
    }
}

/// The mutation one tick decided to issue, before it is issued.
///
/// Produced by the pure planners below, executed by the async driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    /// Leave the replica set untouched
    NoOp,
    /// Initialize the replica set with a single seed member
    Initialize {
        /// Address of the seed member
        seed: String,
    },
    /// Reconfigure the set's membership
    Reconfigure {
        /// Addresses to add
        to_add: Vec<String>,
        /// Addresses to remove
        to_remove: Vec<String>,
        /// Whether to bypass the requirement that a primary drive the change
        force: bool,
    },
}

// ============================================================================
// Pure Planners
// ============================================================================

/// Decide what to do when the node belongs to a set that answered its
/// status query.
///
/// If this node is primary it performs membership upkeep; if another member
/// is primary there is nothing to do; if the set has no primary at all, the
/// election winner force-reconfigures to re-seat quorum.
#[must_use]
pub fn plan_in_set(
    status: &ReplSetStatus,
    roster: &[PeerPod],
    host_ip: Ipv4Addr,
    now: DateTime,
    config: &Config,
) -> TickAction {
    match status.primary() {
        Some(primary) if primary.is_self => {
            debug!(set = %status.set, "local node is primary");
            plan_membership(roster, &status.members, now, config, false)
        }
        Some(primary) => {
            debug!(primary = %primary.name, "another member is primary; nothing to do");
            TickAction::NoOp
        }
        None => {
            if election::pod_election(roster, host_ip) {
                info!(set = %status.set, "replica set has no primary; local pod won election");
                plan_membership(roster, &status.members, now, config, true)
            } else {
                debug!("replica set has no primary; election lost");
                TickAction::NoOp
            }
        }
    }
}

/// Decide whether this node should initialize the replica set (code 94).
///
/// `peer_already_in_set` is the joined outcome of the parallel probe phase:
/// when any peer already belongs to a set, that peer's coordinator will add
/// us on a later tick. Only when every probe came back negative does the
/// election winner initialize, seeding the set with the sorted-first pod's
/// stable endpoint (preferred) or the local host endpoint (fallback).
#[must_use]
pub fn plan_initiation(
    roster: &[PeerPod],
    host: &HostIdentity,
    config: &Config,
    peer_already_in_set: bool,
) -> TickAction {
    if peer_already_in_set {
        info!("a peer already belongs to a replica set; waiting to be added");
        return TickAction::NoOp;
    }

    if !election::pod_election(roster, host.ip) {
        debug!("replica set uninitialized; election lost");
        return TickAction::NoOp;
    }

    let Some(seed_pod) = election::sorted_first(roster) else {
        return TickAction::NoOp;
    };
    debug_assert_eq!(seed_pod.ip, host.ip);
    if seed_pod.ip != host.ip {
        // Only reachable if two Running pods share an IP.
        warn!(
            seed_ip = %seed_pod.ip,
            host_ip = %host.ip,
            "election winner differs from sorted-first pod; roster IPs are not unique"
        );
    }
    let seed = seed_pod
        .stable_endpoint(config)
        .unwrap_or_else(|| host.endpoint.clone());

    TickAction::Initialize { seed }
}

/// Decide what to do when the node's configuration is invalid (code 93).
///
/// The election winner force-reconfigures unconditionally to re-seat
/// quorum. The driver surfaces no member list alongside the failed status,
/// so the diff runs against an empty membership.
#[must_use]
pub fn plan_invalid_set(
    roster: &[PeerPod],
    host_ip: Ipv4Addr,
    now: DateTime,
    config: &Config,
) -> TickAction {
    if !election::pod_election(roster, host_ip) {
        debug!("invalid replica set config; election lost");
        return TickAction::NoOp;
    }

    info!("invalid replica set config; local pod won election, forcing reconfiguration");
    plan_membership(roster, &[], now, config, true)
}

/// Membership upkeep decided by the acting (or elected) coordinator.
///
/// With `force` unset, an empty diff plans no action at all. With `force`
/// set a reconfiguration is planned even when the diff is empty: re-seating
/// quorum is the point, not the diff.
fn plan_membership(
    roster: &[PeerPod],
    members: &[ReplSetMember],
    now: DateTime,
    config: &Config,
    force: bool,
) -> TickAction {
    let to_add = diff::addrs_to_add(roster, members, config);
    let to_remove = diff::addrs_to_remove(members, now, config.unhealthy_after);

    if to_add.is_empty() && to_remove.is_empty() && !force {
        debug!("membership matches the roster; no reconfiguration needed");
        return TickAction::NoOp;
    }

    TickAction::Reconfigure {
        to_add,
        to_remove,
        force,
    }
}

// ============================================================================
// Async Driver
// ============================================================================

/// The sidecar's long-lived state: configuration, host identity, kube client.
///
/// Everything else is tick-scoped.
pub struct Sidecar {
    config: Config,
    host: HostIdentity,
    kube: kube::Client,
}

impl Sidecar {
    /// Assemble a sidecar from its startup-time pieces.
    #[must_use]
    pub fn new(config: Config, host: HostIdentity, kube: kube::Client) -> Self {
        Self { config, host, kube }
    }

    /// Run ticks forever, sleeping `loopSleepSeconds` between them.
    ///
    /// This is the top of the error-handling stack: tick errors are logged
    /// and counted here, never propagated. The future only resolves if the
    /// surrounding select drops it (signal-driven shutdown).
    pub async fn workloop(&self) -> anyhow::Result<()> {
        info!(
            host = %self.host.endpoint,
            sleep_secs = self.config.loop_sleep.as_secs(),
            "starting reconciliation loop"
        );

        loop {
            let started = Instant::now();
            match self.tick().await {
                Ok(outcome) => {
                    info!(outcome = outcome.as_str(), "tick complete");
                    metrics::record_tick_outcome(outcome.as_str(), started.elapsed());
                }
                Err(e) => {
                    error!(error = %e, stage = e.stage(), "tick failed");
                    metrics::record_tick_error(e.stage(), started.elapsed());
                }
            }
            tokio::time::sleep(self.config.loop_sleep).await;
        }
    }

    /// Run one reconciliation tick.
    ///
    /// Acquisition is serial: the roster listing runs first, and the
    /// database session is only opened if it succeeds. The session is owned
    /// by this tick exclusively and closed on every exit path.
    ///
    /// # Errors
    ///
    /// Any acquisition, status, probe, or mutation failure aborts the tick;
    /// see [`Error`] for the taxonomy.
    pub async fn tick(&self) -> Result<TickOutcome, Error> {
        let roster = pods::list_peer_pods(&self.kube, &self.config).await?;
        metrics::set_peer_pods(roster.len());
        if roster.is_empty() {
            info!("no Running peer pods with addresses; nothing to reconcile");
            return Ok(TickOutcome::NoOp);
        }

        let session =
            ReplSetSession::open(LOCAL_MONGO_HOST, self.config.mongo_port, &self.config).await?;
        let now = DateTime::now();
        let result = self.tick_with_session(&session, &roster, now).await;
        session.close().await;
        result
    }

    /// Classify the status, plan the tick's action, and execute it.
    async fn tick_with_session(
        &self,
        session: &ReplSetSession,
        roster: &[PeerPod],
        now: DateTime,
    ) -> Result<TickOutcome, Error> {
        let action = match session.repl_set_status().await? {
            StatusOutcome::InSet(status) => {
                plan_in_set(&status, roster, self.host.ip, now, &self.config)
            }
            StatusOutcome::NotYetInitialized => {
                // Fan out to all peers and join every outcome before
                // deciding; partial probe results are never consumed.
                let probes = roster
                    .iter()
                    .map(|pod| mongo::is_in_repl_set(pod.ip, &self.config));
                let results = futures::future::try_join_all(probes).await?;
                let peer_already_in_set = results.into_iter().any(|in_set| in_set);
                plan_initiation(roster, &self.host, &self.config, peer_already_in_set)
            }
            StatusOutcome::InvalidConfig => {
                plan_invalid_set(roster, self.host.ip, now, &self.config)
            }
        };
        self.execute(session, action).await
    }

    /// Issue the planned mutation, if any.
    async fn execute(
        &self,
        session: &ReplSetSession,
        action: TickAction,
    ) -> Result<TickOutcome, Error> {
        match action {
            TickAction::NoOp => Ok(TickOutcome::NoOp),
            TickAction::Initialize { seed } => {
                info!(seed = %seed, "initializing replica set");
                session.init_repl_set(&seed).await?;
                metrics::record_replset_initiated();
                Ok(TickOutcome::Initialized)
            }
            TickAction::Reconfigure {
                to_add,
                to_remove,
                force,
            } => {
                info!(
                    to_add = ?to_add,
                    to_remove = ?to_remove,
                    force,
                    "reconfiguring replica set membership"
                );
                session
                    .add_new_repl_set_members(&to_add, &to_remove, force)
                    .await?;
                metrics::record_membership_change(to_add.len(), to_remove.len());

                Ok(if force {
                    TickOutcome::ForcedReconfigured
                } else {
                    TickOutcome::Reconfigured
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
