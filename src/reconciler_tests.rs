// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the tick planners.
//!
//! Each end-to-end scenario is asserted against the pure planner functions;
//! the async driver only feeds them classified status, roster, and probe
//! results, and executes whatever they return.

use super::*;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        loop_sleep: Duration::from_secs(5),
        unhealthy_after: Duration::from_secs(60),
        mongo_port: 27017,
        service_name: Some("mongo".to_string()),
        cluster_domain: "cluster.local".to_string(),
        pod_labels: "app=mongo".to_string(),
        namespace: None,
        username: None,
        password: None,
    }
}

fn pod(name: &str, ip: &str) -> PeerPod {
    PeerPod {
        name: name.to_string(),
        namespace: "db".to_string(),
        ip: ip.parse().unwrap(),
    }
}

fn host(ip: &str) -> HostIdentity {
    HostIdentity {
        ip: ip.parse().unwrap(),
        endpoint: format!("{ip}:27017"),
    }
}

fn member(name: &str, state: i32, is_self: bool) -> ReplSetMember {
    ReplSetMember {
        name: name.to_string(),
        state,
        is_self,
        health: 1.0,
        last_heartbeat_recv: Some(DateTime::now()),
    }
}

fn stable(pod_name: &str) -> String {
    format!("{pod_name}.mongo.db.svc.cluster.local:27017")
}

fn status(members: Vec<ReplSetMember>) -> ReplSetStatus {
    ReplSetStatus {
        set: "rs0".to_string(),
        members,
    }
}

// ============================================================================
// Outcome Labels
// ============================================================================

#[test]
fn test_outcome_labels() {
    assert_eq!(TickOutcome::NoOp.as_str(), "noop");
    assert_eq!(TickOutcome::Initialized.as_str(), "initialized");
    assert_eq!(TickOutcome::Reconfigured.as_str(), "reconfigured");
    assert_eq!(
        TickOutcome::ForcedReconfigured.as_str(),
        "forced_reconfigured"
    );
}

#[test]
fn test_outcome_labels_are_distinct() {
    let labels = [
        TickOutcome::NoOp.as_str(),
        TickOutcome::Initialized.as_str(),
        TickOutcome::Reconfigured.as_str(),
        TickOutcome::ForcedReconfigured.as_str(),
    ];
    let unique: std::collections::HashSet<&str> = labels.iter().copied().collect();
    assert_eq!(unique.len(), labels.len());
}

// ============================================================================
// Initiation Planning (NotInSet, code 94)
// ============================================================================

#[test]
fn test_cold_start_only_smallest_ip_initializes() {
    // Three pods, no set exists, every peer probe returned false: only the
    // pod holding 10.0.0.1 initializes, seeded with its stable endpoint.
    let config = test_config();
    let roster = vec![
        pod("mongo-2", "10.0.0.3"),
        pod("mongo-0", "10.0.0.1"),
        pod("mongo-1", "10.0.0.2"),
    ];

    let winner = plan_initiation(&roster, &host("10.0.0.1"), &config, false);
    assert_eq!(
        winner,
        TickAction::Initialize {
            seed: stable("mongo-0"),
        }
    );

    for loser in ["10.0.0.2", "10.0.0.3"] {
        assert_eq!(
            plan_initiation(&roster, &host(loser), &config, false),
            TickAction::NoOp,
            "pod {loser} must not initialize"
        );
    }
}

#[test]
fn test_initiation_defers_to_peer_already_in_set() {
    // Some peer answered its status query: the initialized peer's
    // coordinator will add us on a later tick, even the winner waits.
    let config = test_config();
    let roster = vec![pod("mongo-0", "10.0.0.1"), pod("mongo-1", "10.0.0.2")];

    assert_eq!(
        plan_initiation(&roster, &host("10.0.0.1"), &config, true),
        TickAction::NoOp
    );
}

#[test]
fn test_initiation_seed_falls_back_to_host_endpoint() {
    // Without a configured service name there is no stable endpoint and the
    // seed is the local host endpoint.
    let mut config = test_config();
    config.service_name = None;
    let roster = vec![pod("mongo-0", "10.0.0.1"), pod("mongo-1", "10.0.0.2")];

    assert_eq!(
        plan_initiation(&roster, &host("10.0.0.1"), &config, false),
        TickAction::Initialize {
            seed: "10.0.0.1:27017".to_string(),
        }
    );
}

#[test]
fn test_initiation_on_empty_roster_is_noop() {
    // The driver short-circuits an empty roster before planning; the
    // planner itself also declines to act on one.
    let config = test_config();

    assert_eq!(
        plan_initiation(&[], &host("10.0.0.1"), &config, false),
        TickAction::NoOp
    );
}

// ============================================================================
// In-Set Planning
// ============================================================================

#[test]
fn test_steady_state_is_noop() {
    // Primary is self, roster matches members exactly: both diff sets are
    // empty and no mutation is planned.
    let config = test_config();
    let roster = vec![
        pod("mongo-0", "10.0.0.1"),
        pod("mongo-1", "10.0.0.2"),
        pod("mongo-2", "10.0.0.3"),
    ];
    let status = status(vec![
        member(&stable("mongo-0"), 1, true),
        member(&stable("mongo-1"), 2, false),
        member(&stable("mongo-2"), 2, false),
    ]);

    assert_eq!(
        plan_in_set(&status, &roster, "10.0.0.1".parse().unwrap(), DateTime::now(), &config),
        TickAction::NoOp
    );
}

#[test]
fn test_scale_out_adds_fourth_pod() {
    // A fourth pod appeared: the primary plans a non-forced reconfiguration
    // adding exactly that pod's stable endpoint.
    let config = test_config();
    let roster = vec![
        pod("mongo-0", "10.0.0.1"),
        pod("mongo-1", "10.0.0.2"),
        pod("mongo-2", "10.0.0.3"),
        pod("mongo-3", "10.0.0.4"),
    ];
    let status = status(vec![
        member(&stable("mongo-0"), 1, true),
        member(&stable("mongo-1"), 2, false),
        member(&stable("mongo-2"), 2, false),
    ]);

    assert_eq!(
        plan_in_set(&status, &roster, "10.0.0.1".parse().unwrap(), DateTime::now(), &config),
        TickAction::Reconfigure {
            to_add: vec![stable("mongo-3")],
            to_remove: vec![],
            force: false,
        }
    );
}

#[test]
fn test_other_member_primary_is_noop() {
    // Another member drives membership; this pod plans nothing even though
    // the roster has a pod the members list lacks.
    let config = test_config();
    let roster = vec![
        pod("mongo-0", "10.0.0.1"),
        pod("mongo-1", "10.0.0.2"),
        pod("mongo-3", "10.0.0.4"),
    ];
    let status = status(vec![
        member(&stable("mongo-0"), 1, false),
        member(&stable("mongo-1"), 2, true),
    ]);

    assert_eq!(
        plan_in_set(&status, &roster, "10.0.0.2".parse().unwrap(), DateTime::now(), &config),
        TickAction::NoOp
    );
}

#[test]
fn test_primary_loss_winner_forces_empty_reseat() {
    // No member has state 1: the election winner plans a forced
    // reconfiguration even though both diff sets are empty, and every
    // other pod plans nothing.
    let config = test_config();
    let roster = vec![
        pod("mongo-0", "10.0.0.1"),
        pod("mongo-1", "10.0.0.2"),
        pod("mongo-2", "10.0.0.3"),
    ];
    let status = status(vec![
        member(&stable("mongo-0"), 2, true),
        member(&stable("mongo-1"), 2, false),
        member(&stable("mongo-2"), 2, false),
    ]);
    let now = DateTime::now();

    assert_eq!(
        plan_in_set(&status, &roster, "10.0.0.1".parse().unwrap(), now, &config),
        TickAction::Reconfigure {
            to_add: vec![],
            to_remove: vec![],
            force: true,
        }
    );

    for loser in ["10.0.0.2", "10.0.0.3"] {
        assert_eq!(
            plan_in_set(&status, &roster, loser.parse().unwrap(), now, &config),
            TickAction::NoOp,
            "pod {loser} must not reconfigure"
        );
    }
}

#[test]
fn test_primary_evicts_unhealthy_member_past_grace() {
    // An unhealthy member whose last heartbeat aged past the grace period
    // is planned for removal; one heard from recently is retained.
    let config = test_config();
    let now = DateTime::now();
    let roster = vec![pod("mongo-0", "10.0.0.1")];

    let aged = ReplSetMember {
        name: "10.0.0.9:27017".to_string(),
        state: 8,
        is_self: false,
        health: 0.0,
        last_heartbeat_recv: Some(DateTime::from_millis(now.timestamp_millis() - 120_000)),
    };
    let fresh = ReplSetMember {
        name: "10.0.0.8:27017".to_string(),
        state: 8,
        is_self: false,
        health: 0.0,
        last_heartbeat_recv: Some(DateTime::from_millis(now.timestamp_millis() - 30_000)),
    };
    let status = status(vec![member(&stable("mongo-0"), 1, true), aged, fresh]);

    assert_eq!(
        plan_in_set(&status, &roster, "10.0.0.1".parse().unwrap(), now, &config),
        TickAction::Reconfigure {
            to_add: vec![],
            to_remove: vec!["10.0.0.9:27017".to_string()],
            force: false,
        }
    );
}

// ============================================================================
// Invalid-Set Planning (code 93)
// ============================================================================

#[test]
fn test_invalid_set_winner_forces_reconfiguration_unconditionally() {
    // The winner diffs against the empty member list the failed status left
    // behind and forces a reconfiguration; losers plan nothing.
    let config = test_config();
    let roster = vec![pod("mongo-0", "10.0.0.1"), pod("mongo-1", "10.0.0.2")];
    let now = DateTime::now();

    assert_eq!(
        plan_invalid_set(&roster, "10.0.0.1".parse().unwrap(), now, &config),
        TickAction::Reconfigure {
            to_add: vec![stable("mongo-0"), stable("mongo-1")],
            to_remove: vec![],
            force: true,
        }
    );

    assert_eq!(
        plan_invalid_set(&roster, "10.0.0.2".parse().unwrap(), now, &config),
        TickAction::NoOp
    );
}

#[test]
fn test_invalid_set_forces_even_with_single_pod() {
    // Force is unconditional for the winner; the planned action is never
    // NoOp, because re-seating quorum is the point of this branch.
    let mut config = test_config();
    config.service_name = None;
    let roster = vec![pod("mongo-0", "10.0.0.1")];

    let action = plan_invalid_set(&roster, "10.0.0.1".parse().unwrap(), DateTime::now(), &config);
    match action {
        TickAction::Reconfigure { force: true, .. } => {}
        other => panic!("expected forced reconfiguration, got {other:?}"),
    }
}
