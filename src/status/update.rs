// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Fetch-modify-write of the AddonInstance status.

use crate::error::{ReporterError, StoreError};
use crate::kubernetes::{InstanceKey, InstanceStore};
use crate::types::condition::merge_conditions;
use crate::types::{AddonInstance, HealthCondition};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Result of a successful status write
#[derive(Debug)]
pub struct Pushed {
    /// The instance as written
    pub instance: AddonInstance,
    /// Conditions stored before the write
    pub previous: Vec<HealthCondition>,
}

/// Stamp a heartbeat onto `instance`: upsert `conditions`, mirror the object's
/// generation and set the heartbeat time.
pub fn record_heartbeat(
    instance: &mut AddonInstance,
    conditions: &[HealthCondition],
    now: DateTime<Utc>,
) {
    let generation = instance.metadata.generation.unwrap_or_default();
    let status = instance.status.get_or_insert_with(Default::default);

    merge_conditions(&mut status.conditions, conditions, now);
    status.observed_generation = generation;
    status.last_heartbeat_time = Some(Time(now));
}

/// Re-fetch the instance, merge `conditions` into its status and write it back.
/// Conflicting writes are retried with a fresh read up to `conflict_retries` times.
#[instrument(skip(store, key, conditions), fields(instance = %key, count = conditions.len()))]
pub async fn push_conditions(
    store: &dyn InstanceStore,
    key: &InstanceKey,
    conditions: &[HealthCondition],
    conflict_retries: u32,
    operation: &'static str,
) -> Result<Pushed, ReporterError> {
    let mut attempt = 0;

    loop {
        let mut instance = store
            .get(key)
            .await
            .map_err(|source| ReporterError::RemoteFetchFailed {
                operation,
                key: key.clone(),
                source,
            })?;

        let previous = instance.conditions().to_vec();
        record_heartbeat(&mut instance, conditions, Utc::now());

        match store.update_status(&instance).await {
            Ok(()) => return Ok(Pushed { instance, previous }),
            Err(e) if e.is_conflict() && attempt < conflict_retries => {
                attempt += 1;
                debug!(attempt, "Status update conflicted, re-fetching");
            }
            Err(source) => {
                return Err(ReporterError::RemoteWriteFailed {
                    operation,
                    key: key.clone(),
                    source,
                })
            }
        }
    }
}

/// Put `snapshot` back as the stored condition set. Runs to completion regardless
/// of the caller's cancellation, bounded by `timeout`.
#[instrument(skip(store, key, snapshot), fields(instance = %key))]
pub async fn restore_conditions(
    store: &dyn InstanceStore,
    key: &InstanceKey,
    snapshot: Vec<HealthCondition>,
    conflict_retries: u32,
    timeout: Duration,
) -> Result<(), ReporterError> {
    match tokio::time::timeout(timeout, write_snapshot(store, key, snapshot, conflict_retries)).await
    {
        Ok(Ok(())) => {
            info!("Conditions rolled back to their previous state");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ReporterError::RemoteWriteFailed {
            operation: ROLLBACK,
            key: key.clone(),
            source: StoreError::Unavailable(format!("rollback timed out after {:?}", timeout)),
        }),
    }
}

const ROLLBACK: &str = "rollback";

async fn write_snapshot(
    store: &dyn InstanceStore,
    key: &InstanceKey,
    snapshot: Vec<HealthCondition>,
    conflict_retries: u32,
) -> Result<(), ReporterError> {
    let mut attempt = 0;

    loop {
        let mut instance = store
            .get(key)
            .await
            .map_err(|source| ReporterError::RemoteFetchFailed {
                operation: ROLLBACK,
                key: key.clone(),
                source,
            })?;

        instance
            .status
            .get_or_insert_with(Default::default)
            .conditions = snapshot.clone();

        match store.update_status(&instance).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_conflict() && attempt < conflict_retries => {
                attempt += 1;
                debug!(attempt, "Rollback conflicted, re-fetching");
            }
            Err(source) => {
                return Err(ReporterError::RemoteWriteFailed {
                    operation: ROLLBACK,
                    key: key.clone(),
                    source,
                })
            }
        }
    }
}
