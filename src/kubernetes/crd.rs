// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::api;
use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the AddonInstance CRD to be served by the API server.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_instance_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match check_instance_crd_exists(client).await {
            Ok(true) => {
                info!(
                    "{} CRD ({}/{}) is available",
                    api::KIND,
                    api::GROUP,
                    api::VERSION
                );
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "{} CRD ({}/{}) not yet available, waiting {} seconds...",
                    api::KIND,
                    api::GROUP,
                    api::VERSION,
                    interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for {} CRD: {}, retrying in {} seconds...",
                    api::KIND,
                    e,
                    interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = next_interval(interval);
    }
}

/// Exponential backoff with max cap
fn next_interval(interval: u64) -> u64 {
    (interval * 2).min(POLL_MAX_INTERVAL_SECS)
}

/// Check if the AddonInstance CRD exists by attempting to discover it.
async fn check_instance_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[api::GROUP])
        .run()
        .await?;

    let found = discovery
        .groups()
        .filter(|group| group.name() == api::GROUP)
        .flat_map(|group| group.recommended_resources())
        .any(|(ar, _)| ar.kind == api::KIND && ar.version == api::VERSION);
    Ok(found)
}
