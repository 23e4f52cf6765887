// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Health conditions reported on the AddonInstance status.

use crate::constants::conditions::{reasons, HEALTHY};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A typed health assertion. Conditions are unique per `condition_type`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<Time>,
}

impl HealthCondition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }

    /// Reported until the addon has produced its first real health result
    pub fn no_heartbeat_reported() -> Self {
        Self::new(
            HEALTHY,
            ConditionStatus::Unknown,
            reasons::NO_HEARTBEAT_REPORTED,
            "Addon has not reported a heartbeat yet",
        )
    }

    pub fn all_components_up(message: impl Into<String>) -> Self {
        Self::new(
            HEALTHY,
            ConditionStatus::True,
            reasons::ALL_COMPONENTS_UP,
            message,
        )
    }

    pub fn components_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            HEALTHY,
            ConditionStatus::False,
            reasons::COMPONENTS_UNAVAILABLE,
            message,
        )
    }
}

/// Upsert `condition` into `conditions` by type.
///
/// The transition time of an existing entry is kept when its status does not
/// change, so re-applying the same condition leaves the list untouched.
pub fn set_condition(
    conditions: &mut Vec<HealthCondition>,
    condition: HealthCondition,
    now: DateTime<Utc>,
) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time =
                    Some(condition.last_transition_time.unwrap_or(Time(now)));
            } else if existing.last_transition_time.is_none() {
                existing.last_transition_time = Some(Time(now));
            }
            existing.reason = condition.reason;
            existing.message = condition.message;
        }
        None => {
            let last_transition_time = condition.last_transition_time.clone().or(Some(Time(now)));
            conditions.push(HealthCondition {
                last_transition_time,
                ..condition
            });
        }
    }
}

/// Upsert every condition of `updates`, in order
pub fn merge_conditions(
    conditions: &mut Vec<HealthCondition>,
    updates: &[HealthCondition],
    now: DateTime<Utc>,
) {
    for condition in updates {
        set_condition(conditions, condition.clone(), now);
    }
}

pub fn find_condition<'a>(
    conditions: &'a [HealthCondition],
    condition_type: &str,
) -> Option<&'a HealthCondition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}
