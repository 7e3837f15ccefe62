// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Membership diff between the pod roster and the replica-set members.
//!
//! Both functions are pure and order-preserving, and their outputs are
//! disjoint by construction: additions are drawn from pods, removals from
//! members. In the steady state both come back empty and the tick issues no
//! mutation at all.

use crate::config::Config;
use crate::mongo::ReplSetMember;
use crate::pods::PeerPod;
use mongodb::bson::DateTime;
use std::time::Duration;

/// Addresses of roster pods that are not yet replica-set members.
///
/// A pod is already a member when some member's `name` equals either its IP
/// endpoint or its stable endpoint; matching accepts both forms because the
/// set may have been built before (or after) a service name was configured.
/// For the emitted address the stable endpoint is preferred when available.
#[must_use]
pub fn addrs_to_add(
    pods: &[PeerPod],
    members: &[ReplSetMember],
    config: &Config,
) -> Vec<String> {
    pods.iter()
        .filter_map(|pod| {
            let ip_endpoint = pod.ip_endpoint(config.mongo_port);
            let stable = pod.stable_endpoint(config);
            let already_member = members.iter().any(|member| {
                member.name == ip_endpoint || stable.as_deref() == Some(member.name.as_str())
            });
            if already_member {
                None
            } else {
                Some(stable.unwrap_or(ip_endpoint))
            }
        })
        .collect()
}

/// Addresses of members that are unhealthy and past the grace period.
///
/// Both conditions must hold: `health == false` AND the last received
/// heartbeat is older than `now - grace`. A member that is merely unhealthy
/// but recently heard-from is kept, as is an unhealthy member that has never
/// reported a heartbeat timestamp at all.
#[must_use]
pub fn addrs_to_remove(members: &[ReplSetMember], now: DateTime, grace: Duration) -> Vec<String> {
    let grace_millis = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now.timestamp_millis().saturating_sub(grace_millis);

    members
        .iter()
        .filter(|member| {
            !member.healthy()
                && member
                    .last_heartbeat_recv
                    .is_some_and(|heard| heard.timestamp_millis() < cutoff)
        })
        .map(|member| member.name.clone())
        .collect()
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
