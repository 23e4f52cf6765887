// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::kubernetes::InstanceKey;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a RemoteInstanceStore
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("AddonInstance {0} not found")]
    NotFound(InstanceKey),

    #[error("Conflicting update of AddonInstance {0}")]
    Conflict(InstanceKey),

    #[error("Failed to encode status patch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Errors returned by the StatusReporter
#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("StatusReporter is already running")]
    AlreadyRunning,

    #[error("StatusReporter found to be stopped: unable to {0}")]
    Stopped(&'static str),

    #[error("Failed to fetch AddonInstance {key} during {operation}: {source}")]
    RemoteFetchFailed {
        operation: &'static str,
        key: InstanceKey,
        #[source]
        source: StoreError,
    },

    #[error("Failed to update status of AddonInstance {key} during {operation}: {source}")]
    RemoteWriteFailed {
        operation: &'static str,
        key: InstanceKey,
        #[source]
        source: StoreError,
    },

    #[error("{0} cancelled")]
    Cancelled(&'static str),

    #[error("{operation} cancelled; rolling back conditions failed: {source}")]
    RollbackFailed {
        operation: &'static str,
        #[source]
        source: Box<ReporterError>,
    },

    #[error("StatusReporter did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("Giving up after {failures} consecutive failed heartbeats: {source}")]
    HeartbeatsExhausted {
        failures: u32,
        #[source]
        source: Box<ReporterError>,
    },

    #[error("Invalid reporter configuration: {0}")]
    InvalidConfig(String),
}

impl ReporterError {
    /// True for errors caused by the caller's cancellation, including the ones
    /// whose rollback failed afterwards.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ReporterError::Cancelled(_) | ReporterError::RollbackFailed { .. }
        )
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ReporterError::Stopped(_))
    }
}

/// Errors surfaced by the reconcilers
#[derive(Error, Debug)]
pub enum AddonError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Status reporting failed: {0}")]
    ReporterError(#[from] ReporterError),
}

pub type Result<T, E = AddonError> = std::result::Result<T, E>;
