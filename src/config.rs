// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{heartbeat, DEFAULT_INSTANCE_NAME};
use crate::error::ReporterError;
use crate::kubernetes::InstanceKey;
use crate::types::{duration, HealthCondition};
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace the addon and its AddonInstance live in
    pub addon_namespace: String,
    /// Name of the AddonInstance to report to
    pub instance_name: String,
    pub reporter: ReporterConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let addon_namespace = env::var("ADDON_NAMESPACE")
            .context("ADDON_NAMESPACE environment variable not set")?;
        let instance_name =
            env::var("ADDON_INSTANCE_NAME").unwrap_or_else(|_| DEFAULT_INSTANCE_NAME.to_string());

        let mut reporter = ReporterConfig::default();
        if let Ok(raw) = env::var("HEARTBEAT_MAX_FAILURES") {
            let max: u32 = raw
                .parse()
                .with_context(|| format!("HEARTBEAT_MAX_FAILURES is not a number: {}", raw))?;
            reporter.max_consecutive_failures = Some(max);
        }
        if let Ok(raw) = env::var("STATUS_STOP_TIMEOUT") {
            reporter.stop_timeout = duration::parse(&raw)
                .with_context(|| format!("STATUS_STOP_TIMEOUT is not a duration: {}", raw))?;
        }
        reporter.validate()?;

        Ok(Config {
            addon_namespace,
            instance_name,
            reporter,
        })
    }

    pub fn instance_key(&self) -> InstanceKey {
        InstanceKey::new(&self.instance_name, &self.addon_namespace)
    }
}

/// Tunables of the StatusReporter
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Heartbeat period used while the AddonInstance has none or a zero one
    pub default_interval: Duration,
    /// How long `stop` waits for the loop to exit
    pub stop_timeout: Duration,
    /// Bound on restoring conditions after an abandoned hand-off
    pub rollback_timeout: Duration,
    /// Re-fetch attempts when a status write hits a stale resourceVersion
    pub conflict_retries: u32,
    /// Exit the loop after this many consecutive failed heartbeats. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
    /// Conditions re-sent until the first `set_conditions`
    pub initial_conditions: Vec<HealthCondition>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            default_interval: heartbeat::DEFAULT_PERIOD,
            stop_timeout: heartbeat::STOP_TIMEOUT,
            rollback_timeout: heartbeat::ROLLBACK_TIMEOUT,
            conflict_retries: heartbeat::CONFLICT_RETRIES,
            max_consecutive_failures: None,
            initial_conditions: vec![HealthCondition::no_heartbeat_reported()],
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<(), ReporterError> {
        if self.default_interval.is_zero() {
            return Err(ReporterError::InvalidConfig(
                "default_interval must be greater than zero".to_string(),
            ));
        }
        if self.stop_timeout.is_zero() {
            return Err(ReporterError::InvalidConfig(
                "stop_timeout must be greater than zero".to_string(),
            ));
        }
        if self.rollback_timeout.is_zero() {
            return Err(ReporterError::InvalidConfig(
                "rollback_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(ReporterError::InvalidConfig(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for condition in &self.initial_conditions {
            if !seen.insert(condition.condition_type.as_str()) {
                return Err(ReporterError::InvalidConfig(format!(
                    "duplicate initial condition type {}",
                    condition.condition_type
                )));
            }
        }

        Ok(())
    }
}
