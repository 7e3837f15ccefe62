// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Leaderless, deterministic election.
//!
//! Every replica runs the same pure function over the same (eventually
//! consistent) roster and therefore picks the same actor without any
//! coordination: the pod with the numerically smallest IPv4 address wins.
//! Within one namespace every Running pod has a unique routable IP, so ties
//! cannot occur; if that invariant is ever violated the functions still
//! return a single winner by list position, and every mutation the winner
//! performs is idempotent at the database layer.

use crate::pods::PeerPod;
use std::net::Ipv4Addr;

/// The 32-bit unsigned integer value of a dotted-quad IPv4 address.
///
/// Total ordering over this value matches ascending dotted-quad order for
/// well-formed addresses.
#[must_use]
pub fn ip_to_long(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

/// The roster entry with the smallest IP, or `None` on an empty roster.
///
/// When several entries share an IP (invariant violation) the first by list
/// position wins.
#[must_use]
pub fn sorted_first(pods: &[PeerPod]) -> Option<&PeerPod> {
    pods.iter().min_by_key(|pod| ip_to_long(pod.ip))
}

/// Whether the local pod is the actor this tick.
///
/// Returns `true` iff the roster entry with the smallest numeric IP carries
/// `host_ip`. Callers never invoke this on an empty roster (the reconciler
/// short-circuits first), but an empty roster simply loses.
#[must_use]
pub fn pod_election(pods: &[PeerPod], host_ip: Ipv4Addr) -> bool {
    sorted_first(pods).is_some_and(|winner| winner.ip == host_ip)
}

#[cfg(test)]
#[path = "election_tests.rs"]
mod election_tests;
