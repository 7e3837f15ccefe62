// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Mongocar - MongoDB Replica-Set Sidecar for Kubernetes
//!
//! Mongocar is a sidecar controller that continuously reconciles the
//! membership of a MongoDB replica set with the set of pods currently
//! scheduled by Kubernetes. One instance runs alongside every database pod;
//! each instance observes its peers, agrees with them (without external
//! coordination) on who should act, and mutates the replica-set
//! configuration so that it always reflects the live pod roster.
//!
//! ## Overview
//!
//! Each tick the sidecar lists its peer pods, queries the local mongod's
//! replica-set status, and decides one of: initialize the set, add new
//! members, evict unhealthy members, force a reconfiguration, or do nothing.
//! When a decision needs exactly one actor (initialization, recovery without
//! a primary), the actor is chosen by a deterministic election: the pod with
//! the numerically smallest IP wins, so every replica independently picks
//! the same one.
//!
//! ## Modules
//!
//! - [`reconciler`] - The tick state machine and workloop
//! - [`election`] - Deterministic smallest-IP election
//! - [`diff`] - Membership diff between roster and replica-set members
//! - [`pods`] - Peer roster adapter over the Kubernetes API
//! - [`mongo`] - MongoDB client boundary (status, initiate, reconfig, probe)
//! - [`host`] - Local host identity resolution
//! - [`config`] - Environment-variable configuration
//! - [`errors`] - Error taxonomy of the reconciliation loop
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use mongocar::election::pod_election;
//! use mongocar::pods::PeerPod;
//!
//! let roster = vec![
//!     PeerPod {
//!         name: "mongo-1".to_string(),
//!         namespace: "db".to_string(),
//!         ip: "10.0.0.3".parse().unwrap(),
//!     },
//!     PeerPod {
//!         name: "mongo-0".to_string(),
//!         namespace: "db".to_string(),
//!         ip: "10.0.0.1".parse().unwrap(),
//!     },
//! ];
//!
//! // Only the pod holding 10.0.0.1 acts this tick.
//! assert!(pod_election(&roster, "10.0.0.1".parse().unwrap()));
//! assert!(!pod_election(&roster, "10.0.0.3".parse().unwrap()));
//! ```

pub mod config;
pub mod constants;
pub mod diff;
pub mod election;
pub mod errors;
pub mod host;
pub mod metrics;
pub mod mongo;
pub mod pods;
pub mod reconciler;
