// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::heartbeat::DEFAULT_PERIOD;
use crate::types::condition::HealthCondition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The addon's reporting target on the managing platform.
/// The platform owns the object; the addon only reads the spec and writes the status.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "addons.managed.openshift.io",
    version = "v1alpha1",
    kind = "AddonInstance"
)]
#[kube(namespaced)]
#[kube(status = "AddonInstanceStatus")]
#[serde(rename_all = "camelCase")]
pub struct AddonInstanceSpec {
    /// Desired cadence of heartbeats, e.g. "10s". Unset reads as zero.
    #[serde(default, with = "crate::types::duration")]
    #[schemars(with = "String")]
    pub heartbeat_update_period: Duration,
}

impl Default for AddonInstanceSpec {
    fn default() -> Self {
        Self {
            heartbeat_update_period: DEFAULT_PERIOD,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstanceStatus {
    #[serde(default)]
    pub conditions: Vec<HealthCondition>,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_heartbeat_time: Option<Time>,
}

impl AddonInstance {
    /// The heartbeat period to schedule on, falling back to [`DEFAULT_PERIOD`]
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period_or(DEFAULT_PERIOD)
    }

    /// The heartbeat period to schedule on. A zero or unset period cannot drive
    /// a timer, so `fallback` is used instead.
    pub fn heartbeat_period_or(&self, fallback: Duration) -> Duration {
        match self.spec.heartbeat_update_period {
            d if d.is_zero() => fallback,
            d => d,
        }
    }

    pub fn conditions(&self) -> &[HealthCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn last_heartbeat_time(&self) -> Option<&Time> {
        self.status
            .as_ref()
            .and_then(|s| s.last_heartbeat_time.as_ref())
    }
}
