// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! MongoDB client boundary.
//!
//! This module owns every interaction with mongod: the per-tick management
//! session, the status query with its sentinel-code classification, the
//! mutation commands (initiate, reconfig), and the remote peer probe.
//!
//! The two well-known `replSetGetStatus` error codes are turned into variants
//! of [`StatusOutcome`] right here at the boundary, so the reconciler
//! dispatches on a tagged enum instead of inspecting raw error codes:
//!
//! - code **94** (`NotYetInitialized`): the node has never joined a set
//! - code **93** (`InvalidReplicaSetConfig`): configured, but the
//!   configuration is not currently valid (e.g. quorum lost)
//!
//! Any other status error aborts the tick.

use crate::config::Config;
use crate::constants::{
    ADMIN_DB, APP_NAME, MONGO_CONNECT_TIMEOUT_SECS, MONGO_ERR_INVALID_REPLICA_SET_CONFIG,
    MONGO_ERR_NOT_YET_INITIALIZED, MONGO_SERVER_SELECTION_TIMEOUT_SECS, REPLSET_STATE_PRIMARY,
};
use crate::errors::Error;
use mongodb::{
    bson::{self, doc, Bson, DateTime, Document},
    error::{Error as DriverError, ErrorKind},
    options::{ClientOptions, Credential, ServerAddress},
    Client,
};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Status Model
// ============================================================================

/// One replica-set member as reported by `replSetGetStatus`.
///
/// Consumed read-only per tick. mongod reports `health` as a 0/1 double and
/// omits `health`/`lastHeartbeatRecv` on some server versions for the member
/// that is the queried node itself, so those fields default to healthy/none.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplSetMember {
    /// The member's address string as recorded in the set configuration
    pub name: String,

    /// Member state code; `1` is primary
    #[serde(default)]
    pub state: i32,

    /// Whether this entry describes the queried node itself
    #[serde(rename = "self", default)]
    pub is_self: bool,

    /// Health flag, `1.0` when the member is reachable
    #[serde(default = "default_health")]
    pub health: f64,

    /// When a heartbeat was last received from this member
    #[serde(default)]
    pub last_heartbeat_recv: Option<DateTime>,
}

fn default_health() -> f64 {
    1.0
}

impl ReplSetMember {
    /// Whether the member is currently reachable.
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.health > 0.0
    }

    /// Whether the member is the replica-set primary.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.state == REPLSET_STATE_PRIMARY
    }
}

/// A successful `replSetGetStatus` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplSetStatus {
    /// Replica-set name
    #[serde(default)]
    pub set: String,

    /// The current membership as seen by the queried node
    #[serde(default)]
    pub members: Vec<ReplSetMember>,
}

impl ReplSetStatus {
    /// The member currently acting as primary, if any.
    #[must_use]
    pub fn primary(&self) -> Option<&ReplSetMember> {
        self.members.iter().find(|member| member.is_primary())
    }
}

/// Classified outcome of a `replSetGetStatus` query.
///
/// Codes 93 and 94 are recoverable situations with distinct remedies, not
/// errors: 94 requires initialization, 93 a forced reconfigure. Everything
/// else surfaces as [`Error::StatusFailure`] and aborts the tick.
#[derive(Debug)]
pub enum StatusOutcome {
    /// The node belongs to a replica set and reported its status
    InSet(ReplSetStatus),
    /// Code 94: the node has never joined a replica set
    NotYetInitialized,
    /// Code 93: configured, but the configuration is not currently valid
    InvalidConfig,
}

impl StatusOutcome {
    /// Map a server command error code to its classified outcome, if any.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            MONGO_ERR_NOT_YET_INITIALIZED => Some(Self::NotYetInitialized),
            MONGO_ERR_INVALID_REPLICA_SET_CONFIG => Some(Self::InvalidConfig),
            _ => None,
        }
    }
}

// ============================================================================
// Management Session
// ============================================================================

/// A management session to one mongod, owned by a single tick.
///
/// Opened at the top of the tick and closed on every exit path; nothing
/// outlives the tick except the host identity and static configuration.
pub struct ReplSetSession {
    client: Client,
    endpoint: String,
}

impl ReplSetSession {
    /// Open a management session and verify the server is reachable.
    ///
    /// The driver connects lazily, so a `ping` round-trip is issued here to
    /// keep "session open failed" and "status query failed" distinguishable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseUnavailable`] if the client cannot be built
    /// or the server does not answer the ping.
    pub async fn open(host: &str, port: u16, config: &Config) -> Result<Self, Error> {
        let endpoint = format!("{host}:{port}");
        let client = Client::with_options(client_options(host, port, config)).map_err(|e| {
            Error::DatabaseUnavailable {
                endpoint: endpoint.clone(),
                source: e,
            }
        })?;

        if let Err(e) = client.database(ADMIN_DB).run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(Error::DatabaseUnavailable { endpoint, source: e });
        }

        debug!(endpoint = %endpoint, "opened management session");
        Ok(Self { client, endpoint })
    }

    /// Release the session's connections.
    pub async fn close(self) {
        self.client.shutdown().await;
    }

    /// The endpoint this session talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn admin_command(&self, command: Document) -> Result<Document, DriverError> {
        self.client.database(ADMIN_DB).run_command(command).await
    }

    /// Query and classify the replica-set status of this node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatusFailure`] for any error other than the two
    /// classified codes, or when the status document does not deserialize.
    pub async fn repl_set_status(&self) -> Result<StatusOutcome, Error> {
        match self.admin_command(doc! { "replSetGetStatus": 1 }).await {
            Ok(response) => {
                let status: ReplSetStatus = bson::from_document(response)
                    .map_err(|e| Error::StatusFailure { source: e.into() })?;
                Ok(StatusOutcome::InSet(status))
            }
            Err(e) => match command_error_code(&e).and_then(StatusOutcome::from_code) {
                Some(outcome) => Ok(outcome),
                None => Err(Error::StatusFailure { source: e }),
            },
        }
    }

    /// Initialize a new replica set with a single seed member.
    ///
    /// mongod's `replSetInitiate {}` seeds the set with whatever name the
    /// node knows itself by, which inside a pod is rarely the address peers
    /// can reach. The member is therefore renamed to `seed` with a forced
    /// reconfigure immediately after initiation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationFailure`] naming the command that failed.
    pub async fn init_repl_set(&self, seed: &str) -> Result<(), Error> {
        self.admin_command(doc! { "replSetInitiate": {} })
            .await
            .map_err(|e| Error::MutationFailure {
                operation: "replSetInitiate",
                source: e,
            })?;

        let mut config = self.repl_set_config().await?;
        rename_sole_member(&mut config, seed).map_err(|e| Error::MutationFailure {
            operation: "replSetInitiate",
            source: e,
        })?;
        self.reconfig(config, true).await
    }

    /// Reconfigure the set's membership: add `to_add`, drop `to_remove`.
    ///
    /// Idempotent at this layer: addresses already present are not added
    /// twice, addresses already absent are ignored, and when both input sets
    /// are empty no command is issued at all; with `force` set, the
    /// (possibly unchanged) configuration is force-reapplied to re-seat
    /// quorum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MutationFailure`] naming the command that failed.
    pub async fn add_new_repl_set_members(
        &self,
        to_add: &[String],
        to_remove: &[String],
        force: bool,
    ) -> Result<(), Error> {
        if to_add.is_empty() && to_remove.is_empty() && !force {
            return Ok(());
        }

        let mut config = self.repl_set_config().await?;
        apply_membership(&mut config, to_add, to_remove).map_err(|e| Error::MutationFailure {
            operation: "replSetReconfig",
            source: e,
        })?;
        self.reconfig(config, force).await
    }

    async fn repl_set_config(&self) -> Result<Document, Error> {
        let response = self
            .admin_command(doc! { "replSetGetConfig": 1 })
            .await
            .map_err(|e| Error::MutationFailure {
                operation: "replSetGetConfig",
                source: e,
            })?;
        response
            .get_document("config")
            .cloned()
            .map_err(|_| Error::MutationFailure {
                operation: "replSetGetConfig",
                source: DriverError::custom("replSetGetConfig response carries no config document"),
            })
    }

    async fn reconfig(&self, config: Document, force: bool) -> Result<(), Error> {
        debug!(endpoint = %self.endpoint, force, "issuing replSetReconfig");
        self.admin_command(doc! { "replSetReconfig": config, "force": force })
            .await
            .map(|_| ())
            .map_err(|e| Error::MutationFailure {
                operation: "replSetReconfig",
                source: e,
            })
    }
}

// ============================================================================
// Remote Peer Probe
// ============================================================================

/// Ask a peer mongod whether it already belongs to a replica set.
///
/// Independent of the local session: a short-lived direct connection is made
/// to the peer's management port and torn down before returning. A status
/// response or an invalid-config error both mean "the set exists somewhere";
/// only `NotYetInitialized` means the peer is still pristine.
///
/// # Errors
///
/// Returns [`Error::ProbeFailure`] for any other error; the caller treats a
/// single failed probe as inconclusive for the entire batch.
pub async fn is_in_repl_set(peer_ip: Ipv4Addr, config: &Config) -> Result<bool, Error> {
    let peer = format!("{}:{}", peer_ip, config.mongo_port);
    let client = Client::with_options(client_options(
        &peer_ip.to_string(),
        config.mongo_port,
        config,
    ))
    .map_err(|e| Error::ProbeFailure {
        peer: peer.clone(),
        source: e,
    })?;

    let result = client
        .database(ADMIN_DB)
        .run_command(doc! { "replSetGetStatus": 1 })
        .await;
    client.shutdown().await;

    match result {
        Ok(_) => Ok(true),
        Err(e) => match command_error_code(&e) {
            Some(MONGO_ERR_NOT_YET_INITIALIZED) => Ok(false),
            Some(MONGO_ERR_INVALID_REPLICA_SET_CONFIG) => Ok(true),
            _ => {
                warn!(peer = %peer, error = %e, "peer probe failed");
                Err(Error::ProbeFailure { peer, source: e })
            }
        },
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Client options for a direct connection to one mongod.
fn client_options(host: &str, port: u16, config: &Config) -> ClientOptions {
    let mut options = ClientOptions::default();
    options.hosts = vec![ServerAddress::Tcp {
        host: host.to_string(),
        port: Some(port),
    }];
    options.direct_connection = Some(true);
    options.app_name = Some(APP_NAME.to_string());
    options.server_selection_timeout =
        Some(Duration::from_secs(MONGO_SERVER_SELECTION_TIMEOUT_SECS));
    options.connect_timeout = Some(Duration::from_secs(MONGO_CONNECT_TIMEOUT_SECS));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.credential = Some(
            Credential::builder()
                .username(username.clone())
                .password(password.clone())
                .build(),
        );
    }
    options
}

/// Extract the server command error code, if the error carries one.
fn command_error_code(err: &DriverError) -> Option<i32> {
    match *err.kind {
        ErrorKind::Command(ref command_error) => Some(command_error.code),
        _ => None,
    }
}

/// Apply a membership diff to a replica-set config document in place.
///
/// Members whose `host` is listed in `to_remove` are dropped; each address in
/// `to_add` not already present is appended with a fresh `_id`; the config
/// `version` is bumped. Pure document manipulation, shared by the reconfig
/// paths and exercised directly by unit tests.
pub(crate) fn apply_membership(
    config: &mut Document,
    to_add: &[String],
    to_remove: &[String],
) -> Result<(), DriverError> {
    let members = config
        .get_array_mut("members")
        .map_err(|_| DriverError::custom("replica set config carries no members array"))?;

    members.retain(|member| {
        member_host(member).is_none_or(|host| !to_remove.iter().any(|r| r == host))
    });

    let mut next_id = members.iter().filter_map(member_id).max().unwrap_or(0) + 1;
    for address in to_add {
        let present = members
            .iter()
            .any(|member| member_host(member) == Some(address.as_str()));
        if present {
            continue;
        }
        members.push(Bson::Document(doc! { "_id": next_id, "host": address }));
        next_id += 1;
    }

    bump_version(config);
    Ok(())
}

/// Rename the sole member of a freshly initiated config to `seed`.
fn rename_sole_member(config: &mut Document, seed: &str) -> Result<(), DriverError> {
    let members = config
        .get_array_mut("members")
        .map_err(|_| DriverError::custom("replica set config carries no members array"))?;
    let Some(Bson::Document(member)) = members.first_mut() else {
        return Err(DriverError::custom(
            "freshly initiated replica set config has no members",
        ));
    };
    member.insert("host", seed);
    bump_version(config);
    Ok(())
}

/// Increment the config `version` field, tolerating either integer width.
fn bump_version(config: &mut Document) {
    let version = match config.get("version") {
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        _ => 0,
    };
    config.insert("version", Bson::Int64(version + 1));
}

/// The `host` field of a member document.
fn member_host(member: &Bson) -> Option<&str> {
    member.as_document().and_then(|d| d.get_str("host").ok())
}

/// The `_id` field of a member document, tolerating either integer width.
fn member_id(member: &Bson) -> Option<i64> {
    match member.as_document()?.get("_id") {
        Some(Bson::Int32(v)) => Some(i64::from(*v)),
        Some(Bson::Int64(v)) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
#[path = "mongo_tests.rs"]
mod mongo_tests;
