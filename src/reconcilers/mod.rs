// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that drive the StatusReporter from watch events.

pub mod health;
pub mod instance;

pub use health::HealthReconciler;
pub use instance::InstanceReconciler;
