// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! AddonInstance custom resource and health condition types.

pub mod addon_instance;
pub mod condition;
pub mod duration;

pub use addon_instance::{AddonInstance, AddonInstanceSpec, AddonInstanceStatus};
pub use condition::{ConditionStatus, HealthCondition};
