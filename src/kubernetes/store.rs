// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Narrow read/update access to the AddonInstance held by the API server.

use crate::constants::{DEFAULT_INSTANCE_NAME, OPERATOR_NAME};
use crate::error::StoreError;
use crate::types::AddonInstance;
use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use std::fmt;
use tracing::{debug, instrument};

/// Namespace and name of the AddonInstance a reporter writes to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub name: String,
    pub namespace: String,
}

impl InstanceKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// The conventional `addon-instance` in the given namespace
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self::new(DEFAULT_INSTANCE_NAME, namespace)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Remote store holding AddonInstance objects.
///
/// Implementations must reject `update_status` when the instance's
/// resourceVersion is stale, reporting [`StoreError::Conflict`].
#[async_trait]
pub trait InstanceStore: Send + Sync + 'static {
    async fn get(&self, key: &InstanceKey) -> Result<AddonInstance, StoreError>;

    async fn update_status(&self, instance: &AddonInstance) -> Result<(), StoreError>;
}

/// InstanceStore backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeInstanceStore {
    client: Client,
}

impl KubeInstanceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<AddonInstance> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl InstanceStore for KubeInstanceStore {
    #[instrument(skip(self), fields(instance = %key))]
    async fn get(&self, key: &InstanceKey) -> Result<AddonInstance, StoreError> {
        match self.api(&key.namespace).get(&key.name).await {
            Ok(instance) => Ok(instance),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(StoreError::NotFound(key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, instance), fields(instance = %format!("{}/{}", instance.namespace().unwrap_or_default(), instance.name_any())))]
    async fn update_status(&self, instance: &AddonInstance) -> Result<(), StoreError> {
        let key = InstanceKey::new(instance.name_any(), instance.namespace().unwrap_or_default());

        // Carrying the resourceVersion makes the API server reject stale writes with 409
        let patch = json!({
            "metadata": { "resourceVersion": instance.resource_version() },
            "status": serde_json::to_value(&instance.status)?,
        });

        let pp = PatchParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        match self
            .api(&key.namespace)
            .patch_status(&key.name, &pp, &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!("Status updated");
                Ok(())
            }
            Err(kube::Error::Api(err)) if err.code == 404 => Err(StoreError::NotFound(key)),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(StoreError::Conflict(key)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addon_instance_json, status_json, MockService};
    use crate::types::{AddonInstanceStatus, HealthCondition};
    use std::time::Duration;

    const INSTANCE_PATH: &str =
        "/apis/addons.managed.openshift.io/v1alpha1/namespaces/my-addon/addoninstances/addon-instance";

    fn key() -> InstanceKey {
        InstanceKey::in_namespace("my-addon")
    }

    #[test]
    fn test_instance_key_display() {
        assert_eq!(key().to_string(), "my-addon/addon-instance");
    }

    #[tokio::test]
    async fn test_get_parses_instance() {
        let mock = MockService::new().on_get(
            INSTANCE_PATH,
            200,
            &addon_instance_json("addon-instance", "my-addon", "30s"),
        );
        let store = KubeInstanceStore::new(mock.into_client());

        let instance = store.get(&key()).await.unwrap();

        assert_eq!(instance.name_any(), "addon-instance");
        assert_eq!(instance.heartbeat_period(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_get_missing_instance_is_not_found() {
        let store = KubeInstanceStore::new(MockService::new().into_client());

        let err = store.get(&key()).await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound(k) if k == key()));
    }

    #[tokio::test]
    async fn test_update_status_patches_status_subresource() {
        let mock = MockService::new().on_patch(
            &format!("{}/status", INSTANCE_PATH),
            200,
            &addon_instance_json("addon-instance", "my-addon", "30s"),
        );
        let store = KubeInstanceStore::new(mock.clone().into_client());

        let mut instance: AddonInstance =
            serde_json::from_str(&addon_instance_json("addon-instance", "my-addon", "30s"))
                .unwrap();
        instance.status = Some(AddonInstanceStatus {
            conditions: vec![HealthCondition::all_components_up("ok")],
            observed_generation: 1,
            last_heartbeat_time: None,
        });

        store.update_status(&instance).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "PATCH");
        let body: serde_json::Value = serde_json::from_slice(&requests[0].2).unwrap();
        assert_eq!(body["metadata"]["resourceVersion"], "42");
        assert_eq!(body["status"]["conditions"][0]["reason"], "AllComponentsUp");
    }

    #[tokio::test]
    async fn test_update_status_conflict() {
        let mock = MockService::new().on_patch(
            &format!("{}/status", INSTANCE_PATH),
            409,
            &status_json(409, "Conflict", "the object has been modified"),
        );
        let store = KubeInstanceStore::new(mock.into_client());

        let instance: AddonInstance =
            serde_json::from_str(&addon_instance_json("addon-instance", "my-addon", "30s"))
                .unwrap();

        let err = store.update_status(&instance).await.unwrap_err();

        assert!(err.is_conflict());
    }
}
