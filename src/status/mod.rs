// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Heartbeat-driven health reporting to the AddonInstance.

pub mod reporter;
pub mod update;

pub use reporter::StatusReporter;
pub use update::{push_conditions, record_heartbeat, restore_conditions};
