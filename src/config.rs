// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sidecar configuration loaded from environment variables.
//!
//! All options are read once at startup. Numeric options fall back to their
//! defaults when unset or unparseable; `MONGOCAR_POD_LABELS` is the one
//! required option, because a roster that silently defaulted to "every pod in
//! the namespace" could evict members that belong to a different workload.

use crate::constants::{
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_LOOP_SLEEP_SECS, DEFAULT_MONGO_PORT, DEFAULT_UNHEALTHY_SECS,
};
use anyhow::{bail, Result};
use std::time::Duration;

/// Runtime configuration for the sidecar.
#[derive(Clone)]
pub struct Config {
    /// Delay between the end of one tick and the start of the next
    pub loop_sleep: Duration,

    /// Grace period before an unhealthy member becomes a removal candidate
    pub unhealthy_after: Duration,

    /// Port appended to every computed endpoint (IP and stable)
    pub mongo_port: u16,

    /// Service name used to build stable endpoints. When unset, stable
    /// endpoints are never produced and the sidecar falls back to IP
    /// endpoints.
    pub service_name: Option<String>,

    /// DNS suffix used in stable endpoints (typically `cluster.local`)
    pub cluster_domain: String,

    /// Label selector identifying the pods of this database workload,
    /// e.g. `app=mongo,role=db`
    pub pod_labels: String,

    /// Namespace to list pods in. When unset, the kube client's default
    /// (in-cluster service-account) namespace is used.
    pub namespace: Option<String>,

    /// Username for authenticated MongoDB deployments
    pub username: Option<String>,

    /// Password for authenticated MongoDB deployments
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `MONGOCAR_POD_LABELS` is unset or empty, or if
    /// credentials are only half-configured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Separated from [`Config::from_env`] so tests can supply variables
    /// without mutating process-global state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let loop_sleep_secs = parse_or(&lookup, "MONGOCAR_SLEEP_SECONDS", DEFAULT_LOOP_SLEEP_SECS);
        let unhealthy_secs = parse_or(&lookup, "MONGOCAR_UNHEALTHY_SECONDS", DEFAULT_UNHEALTHY_SECS);
        let mongo_port = parse_or(&lookup, "MONGOCAR_MONGO_PORT", DEFAULT_MONGO_PORT);

        let Some(pod_labels) = lookup("MONGOCAR_POD_LABELS").filter(|s| !s.is_empty()) else {
            bail!("MONGOCAR_POD_LABELS must be set to the label selector of the MongoDB pods");
        };

        let service_name = lookup("MONGOCAR_SERVICE_NAME").filter(|s| !s.is_empty());
        let cluster_domain = lookup("MONGOCAR_CLUSTER_DOMAIN")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CLUSTER_DOMAIN.to_string());
        let namespace = lookup("MONGOCAR_NAMESPACE")
            .or_else(|| lookup("POD_NAMESPACE"))
            .filter(|s| !s.is_empty());

        let username = lookup("MONGOCAR_USERNAME").filter(|s| !s.is_empty());
        let password = lookup("MONGOCAR_PASSWORD").filter(|s| !s.is_empty());
        if username.is_some() != password.is_some() {
            bail!("MONGOCAR_USERNAME and MONGOCAR_PASSWORD must be set together");
        }

        Ok(Self {
            loop_sleep: Duration::from_secs(loop_sleep_secs),
            unhealthy_after: Duration::from_secs(unhealthy_secs),
            mongo_port,
            service_name,
            cluster_domain,
            pod_labels,
            namespace,
            username,
            password,
        })
    }
}

/// Parse a variable, falling back to `default` when unset or unparseable.
fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    lookup(name)
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
