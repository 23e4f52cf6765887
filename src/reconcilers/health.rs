// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Health reconciler - watches the addon's Deployments and reports their availability.

use crate::constants::conditions::{reasons, HEALTHY};
use crate::error::{AddonError, Result};
use crate::status::StatusReporter;
use crate::types::{ConditionStatus, HealthCondition};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::ListParams,
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct HealthReconciler {
    client: Client,
    reporter: Arc<StatusReporter>,
    shutdown: CancellationToken,
}

impl HealthReconciler {
    pub fn new(client: Client, reporter: Arc<StatusReporter>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            reporter,
            shutdown,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let deployments = self.deployments();
        let shutdown = self.shutdown.clone();
        let context = Arc::new(self);

        Controller::new(deployments, WatcherConfig::default())
            .graceful_shutdown_on(shutdown.cancelled_owned())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled deployment: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.reporter.key().namespace)
    }
}

#[instrument(skip(deployment, ctx), fields(deployment = %deployment.name_any()))]
async fn reconcile(deployment: Arc<Deployment>, ctx: Arc<HealthReconciler>) -> Result<Action> {
    // Any change can flip the addon's overall health, so always look at all of them
    let deployments = ctx.deployments().list(&ListParams::default()).await?;
    let condition = health_condition(&deployments.items);

    info!(
        status = %condition.status,
        reason = %condition.reason,
        "Reporting addon health"
    );

    match ctx
        .reporter
        .set_conditions(&ctx.shutdown, vec![condition])
        .await
    {
        Ok(()) => Ok(Action::requeue(Duration::from_secs(300))),
        Err(e) if e.is_stopped() => {
            debug!("StatusReporter not running yet, retrying");
            Ok(Action::requeue(Duration::from_secs(10)))
        }
        Err(e) => Err(e.into()),
    }
}

fn error_policy(_deployment: Arc<Deployment>, error: &AddonError, _ctx: Arc<HealthReconciler>) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(60))
}

/// A Deployment is available once it has as many available replicas as it wants
pub fn is_available(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    available >= desired
}

/// Derive the addon's `Healthy` condition from its Deployments
pub fn health_condition(deployments: &[Deployment]) -> HealthCondition {
    if deployments.is_empty() {
        return HealthCondition::new(
            HEALTHY,
            ConditionStatus::Unknown,
            reasons::NO_COMPONENTS_FOUND,
            "No deployments found in the addon namespace",
        );
    }

    let mut unavailable: Vec<String> = deployments
        .iter()
        .filter(|d| !is_available(d))
        .map(|d| d.name_any())
        .collect();

    if unavailable.is_empty() {
        return HealthCondition::all_components_up(format!(
            "All {} deployments are available",
            deployments.len()
        ));
    }

    unavailable.sort();
    HealthCondition::components_unavailable(format!(
        "Deployments not available: {}",
        unavailable.join(", ")
    ))
}
