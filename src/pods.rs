// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Peer roster adapter.
//!
//! One roster snapshot is taken per tick: the pods carrying the configured
//! labels in the sidecar's namespace, filtered to those that are `Running`
//! and have a routable IPv4 address. Everything downstream (election,
//! membership diff, seed selection) operates on the filtered [`PeerPod`]
//! list and never sees a pod without an address.

use crate::config::Config;
use crate::errors::Error;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams},
    Client,
};
use std::net::Ipv4Addr;
use tracing::debug;

/// Phase value a pod must report to be considered part of the roster.
const POD_PHASE_RUNNING: &str = "Running";

/// One peer pod of the database workload, observed this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPod {
    /// Pod name (`metadata.name`)
    pub name: String,
    /// Pod namespace (`metadata.namespace`)
    pub namespace: String,
    /// The pod's IPv4 address (`status.podIP`)
    pub ip: Ipv4Addr,
}

impl PeerPod {
    /// The pod's ephemeral IP endpoint, `podIP:mongoPort`.
    #[must_use]
    pub fn ip_endpoint(&self, mongo_port: u16) -> String {
        format!("{}:{}", self.ip, mongo_port)
    }

    /// The pod's stable DNS endpoint,
    /// `<podName>.<serviceName>.<namespace>.svc.<clusterDomain>:<mongoPort>`.
    ///
    /// Defined only when a service name is configured and the pod's metadata
    /// is complete; `None` otherwise. Preferred over the IP endpoint when
    /// adding members, because it survives pod restarts.
    #[must_use]
    pub fn stable_endpoint(&self, config: &Config) -> Option<String> {
        let service = config.service_name.as_deref()?;
        if self.name.is_empty() || self.namespace.is_empty() {
            return None;
        }
        Some(format!(
            "{}.{}.{}.svc.{}:{}",
            self.name, service, self.namespace, config.cluster_domain, config.mongo_port
        ))
    }
}

/// List the peer pods of this workload and filter them to the usable roster.
///
/// Listing happens before the database session is opened (spec'd acquisition
/// order: no socket churn against mongod while the API server is degraded).
///
/// # Errors
///
/// Returns [`Error::OrchestratorUnavailable`] if the pod listing fails; the
/// tick is aborted and retried on the next timer firing.
pub async fn list_peer_pods(client: &Client, config: &Config) -> Result<Vec<PeerPod>, Error> {
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());

    let api: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    let params = ListParams::default().labels(&config.pod_labels);

    let pods = api
        .list(&params)
        .await
        .map_err(|e| Error::OrchestratorUnavailable { source: e })?;

    let roster = filter_roster(pods.items);
    debug!(
        namespace = %namespace,
        labels = %config.pod_labels,
        peers = roster.len(),
        "listed peer pods"
    );
    Ok(roster)
}

/// Drop pods that are not `Running` or have no parseable IPv4 address.
///
/// Order-preserving over the input list.
#[must_use]
pub fn filter_roster(pods: Vec<Pod>) -> Vec<PeerPod> {
    pods.into_iter()
        .filter_map(|pod| {
            let status = pod.status.as_ref()?;
            if status.phase.as_deref() != Some(POD_PHASE_RUNNING) {
                return None;
            }
            let ip: Ipv4Addr = status.pod_ip.as_deref()?.parse().ok()?;
            Some(PeerPod {
                name: pod.metadata.name.clone().unwrap_or_default(),
                namespace: pod.metadata.namespace.clone().unwrap_or_default(),
                ip,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "pods_tests.rs"]
mod pods_tests;
