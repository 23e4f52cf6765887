// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Instance reconciler - watches the AddonInstance and forwards spec changes to the reporter.

use crate::error::{AddonError, Result};
use crate::kubernetes::InstanceKey;
use crate::status::StatusReporter;
use crate::types::AddonInstance;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, Client, ResourceExt,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub struct InstanceReconciler {
    client: Client,
    reporter: Arc<StatusReporter>,
    shutdown: CancellationToken,
    forwarded: GenerationGate,
}

impl InstanceReconciler {
    pub fn new(client: Client, reporter: Arc<StatusReporter>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            reporter,
            shutdown,
            forwarded: GenerationGate::default(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let key = self.reporter.key().clone();
        let instances: Api<AddonInstance> = Api::namespaced(self.client.clone(), &key.namespace);
        let shutdown = self.shutdown.clone();
        let context = Arc::new(self);

        Controller::new(instances, watch_config(&key))
            .graceful_shutdown_on(shutdown.cancelled_owned())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled AddonInstance: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Only the reporter's own AddonInstance is of interest
fn watch_config(key: &InstanceKey) -> watcher::Config {
    watcher::Config::default().fields(&format!("metadata.name={}", key.name))
}

/// Generation of the AddonInstance last handed to the reporter.
///
/// Status writes, including the reporter's own heartbeats, leave the generation
/// untouched, so only spec edits get through.
#[derive(Default)]
struct GenerationGate(Mutex<Option<i64>>);

impl GenerationGate {
    /// Objects without a generation are always forwarded
    fn is_new(&self, generation: Option<i64>) -> bool {
        generation.is_none() || *self.lock() != generation
    }

    fn record(&self, generation: Option<i64>) {
        *self.lock() = generation;
    }

    fn lock(&self) -> MutexGuard<'_, Option<i64>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn reconcile(instance: Arc<AddonInstance>, ctx: Arc<InstanceReconciler>) -> Result<Action> {
    let generation = instance.metadata.generation;
    if !ctx.forwarded.is_new(generation) {
        debug!("AddonInstance spec unchanged, nothing to forward");
        return Ok(Action::await_change());
    }

    debug!(
        "Reconciling AddonInstance {}/{} with heartbeat period {:?}",
        instance.namespace().unwrap_or_default(),
        instance.name_any(),
        instance.heartbeat_period()
    );

    match ctx
        .reporter
        .report_instance_spec_change(&ctx.shutdown, &instance)
        .await
    {
        Ok(()) => {
            ctx.forwarded.record(generation);
            Ok(Action::await_change())
        }
        // The reporter reads the period itself when it starts
        Err(e) if e.is_stopped() => {
            debug!("StatusReporter not running yet, retrying");
            Ok(Action::requeue(Duration::from_secs(10)))
        }
        Err(e) => Err(e.into()),
    }
}

fn error_policy(
    _instance: Arc<AddonInstance>,
    error: &AddonError,
    _ctx: Arc<InstanceReconciler>,
) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(60))
}
