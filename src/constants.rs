// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used as field manager for status patches
pub const OPERATOR_NAME: &str = "reference-addon";

/// Conventional name of the AddonInstance owned by each addon namespace
pub const DEFAULT_INSTANCE_NAME: &str = "addon-instance";

/// AddonInstance API coordinates
pub mod api {
    pub const GROUP: &str = "addons.managed.openshift.io";
    pub const VERSION: &str = "v1alpha1";
    pub const KIND: &str = "AddonInstance";
}

/// Health condition types and reasons reported on the AddonInstance
pub mod conditions {
    pub const HEALTHY: &str = "Healthy";

    pub mod reasons {
        pub const NO_HEARTBEAT_REPORTED: &str = "NoHeartbeatReported";
        pub const ALL_COMPONENTS_UP: &str = "AllComponentsUp";
        pub const COMPONENTS_UNAVAILABLE: &str = "ComponentsUnavailable";
        pub const NO_COMPONENTS_FOUND: &str = "NoComponentsFound";
    }
}

/// Heartbeat timing defaults
pub mod heartbeat {
    use std::time::Duration;

    /// Used when the AddonInstance does not carry a usable period
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);
    /// How long `stop` waits for the control loop to acknowledge
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(30);
    /// Upper bound for restoring conditions after an abandoned hand-off
    pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(30);
    /// Fetch-modify-write attempts on resourceVersion conflicts
    pub const CONFLICT_RETRIES: u32 = 3;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
