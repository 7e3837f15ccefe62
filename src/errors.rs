// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the reconciliation loop.
//!
//! Every failure a tick can encounter is one of the variants below. The loop
//! is the top of the error-handling stack: errors are logged at the finalize
//! boundary and the next tick re-observes reality. None of them propagate to
//! the caller of the workloop. The single exception is [`Error::InitFailure`],
//! which is raised before the loop ever starts and terminates the process.

use thiserror::Error;

/// Failures surfaced by one reconciliation tick (or by startup).
#[derive(Error, Debug)]
pub enum Error {
    /// Host identity resolution failed at startup.
    ///
    /// Fatal: the election and endpoint computation both depend on the local
    /// pod address, so the process must not proceed to reconciliation.
    #[error("failed to resolve host identity for '{host}': {reason}")]
    InitFailure {
        /// The hostname that could not be resolved
        host: String,
        /// Why resolution failed
        reason: String,
    },

    /// Listing peer pods from the Kubernetes API failed.
    ///
    /// The tick is aborted before a database session is opened; the next tick
    /// retries the listing.
    #[error("failed to list peer pods: {source}")]
    OrchestratorUnavailable {
        /// The underlying Kubernetes API error
        #[source]
        source: kube::Error,
    },

    /// The local management session could not be opened.
    #[error("failed to open management session to {endpoint}: {source}")]
    DatabaseUnavailable {
        /// The endpoint (host:port) that could not be reached
        endpoint: String,
        /// The underlying driver error
        #[source]
        source: mongodb::error::Error,
    },

    /// `replSetGetStatus` failed with an error that is neither of the two
    /// classified codes (93, 94).
    #[error("replica set status query failed: {source}")]
    StatusFailure {
        /// The underlying driver error
        #[source]
        source: mongodb::error::Error,
    },

    /// A replica-set mutation command (initiate, reconfig) failed.
    #[error("replica set command '{operation}' failed: {source}")]
    MutationFailure {
        /// The server command that failed
        operation: &'static str,
        /// The underlying driver error
        #[source]
        source: mongodb::error::Error,
    },

    /// A remote `isInReplSet` probe against a peer pod failed.
    ///
    /// Conservative by design: without a result from every peer we cannot
    /// prove that no peer has already initialized a set, so the whole
    /// uninitialized branch aborts for this tick.
    #[error("peer probe against {peer} failed: {source}")]
    ProbeFailure {
        /// The peer endpoint (host:port) whose probe failed
        peer: String,
        /// The underlying driver error
        #[source]
        source: mongodb::error::Error,
    },
}

impl Error {
    /// Returns the tick stage this error belongs to, used as a metrics label.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InitFailure { .. } => "init",
            Self::OrchestratorUnavailable { .. } => "orchestrator",
            Self::DatabaseUnavailable { .. } => "database",
            Self::StatusFailure { .. } => "status",
            Self::MutationFailure { .. } => "mutation",
            Self::ProbeFailure { .. } => "probe",
        }
    }

    /// Returns true if this error must terminate the process.
    ///
    /// Everything except [`Error::InitFailure`] is tick-scoped: the loop logs
    /// it and re-arms the timer.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InitFailure { .. })
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
