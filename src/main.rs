// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::Result;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reference_addon::config::Config;
use reference_addon::kubernetes::{wait_for_instance_crd, KubeInstanceStore};
use reference_addon::reconcilers::{HealthReconciler, InstanceReconciler};
use reference_addon::status::StatusReporter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting reference addon");

    // Load configuration
    let config = Config::from_env()?;
    let key = config.instance_key();
    info!("Configuration loaded: instance={}", key);

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for AddonInstance CRD to become available...");
    wait_for_instance_crd(&client).await?;

    // The one reporter of this process, shared by every reconciler
    let store = Arc::new(KubeInstanceStore::new(client.clone()));
    let reporter = Arc::new(StatusReporter::new(store, key, config.reporter.clone())?);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let instance_reconciler =
        InstanceReconciler::new(client.clone(), reporter.clone(), shutdown.clone());
    let health_reconciler = HealthReconciler::new(client, reporter.clone(), shutdown.clone());

    info!("Starting status reporter and reconcilers...");

    tokio::try_join!(
        async { reporter.start(shutdown.clone()).await.map_err(anyhow::Error::from) },
        instance_reconciler.run(),
        health_reconciler.run()
    )?;

    info!("Reference addon stopped");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Shutdown signal received");
    token.cancel();
}
