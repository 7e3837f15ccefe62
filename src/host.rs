// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Local host identity.
//!
//! Resolves the pod's own hostname to an IPv4 address once at startup. The
//! resulting [`HostIdentity`] is the self-identifier used by the election and
//! the fallback seed address for replica-set initiation. It is constructed
//! before the workloop starts and never mutated afterwards; a process that
//! cannot resolve its own address must not reconcile.

use crate::errors::Error;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::debug;

/// The local pod's network identity: its IPv4 address and MongoDB endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// The pod's IPv4 address
    pub ip: Ipv4Addr,
    /// `ip:mongoPort`, the local mongod's endpoint
    pub endpoint: String,
}

impl HostIdentity {
    /// Resolve the local pod's identity from the operating environment.
    ///
    /// Kubernetes sets `HOSTNAME` to the pod name inside every container;
    /// `POD_NAME` (downward API) takes precedence when present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitFailure`] if no hostname is available or the
    /// resolver yields no IPv4 address. This error is fatal.
    pub async fn resolve(mongo_port: u16) -> Result<Self, Error> {
        let hostname = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .ok()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InitFailure {
                host: String::new(),
                reason: "neither POD_NAME nor HOSTNAME is set".to_string(),
            })?;
        Self::resolve_host(&hostname, mongo_port).await
    }

    /// Resolve a specific hostname through the system resolver.
    ///
    /// Idempotent: calling twice simply produces a fresh value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitFailure`] if resolution fails or returns only
    /// non-IPv4 addresses.
    pub async fn resolve_host(hostname: &str, mongo_port: u16) -> Result<Self, Error> {
        let addrs = tokio::net::lookup_host((hostname, mongo_port))
            .await
            .map_err(|e| Error::InitFailure {
                host: hostname.to_string(),
                reason: e.to_string(),
            })?;

        let ip = addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| Error::InitFailure {
                host: hostname.to_string(),
                reason: "resolver returned no IPv4 address".to_string(),
            })?;

        debug!(host = hostname, %ip, "resolved local host identity");

        Ok(Self {
            ip,
            endpoint: format!("{ip}:{mongo_port}"),
        })
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod host_tests;
