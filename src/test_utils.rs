// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and the AddonInstance store.

use crate::error::StoreError;
use crate::kubernetes::{InstanceKey, InstanceStore};
use crate::types::{AddonInstance, AddonInstanceSpec, HealthCondition};
use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::client::Body;
use kube::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::Service;

/// Method, path and body of a request seen by [`MockService`]
pub type RecordedRequest = (String, String, Vec<u8>);

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PATCH requests matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = req.into_body().collect().await?.to_bytes().to_vec();
            requests.lock().unwrap().push((method, path, body));

            let (status, body) = response.unwrap_or_else(|| {
                (404, status_json(404, "NotFound", "not found"))
            });
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock AddonInstance JSON response
pub fn addon_instance_json(name: &str, namespace: &str, period: &str) -> String {
    serde_json::json!({
        "apiVersion": "addons.managed.openshift.io/v1alpha1",
        "kind": "AddonInstance",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "test-uid",
            "generation": 1,
            "resourceVersion": "42"
        },
        "spec": { "heartbeatUpdatePeriod": period }
    })
    .to_string()
}

/// Create a Kubernetes Status error body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// An AddonInstance `my-addon/addon-instance` without status
pub fn seeded_instance(period: Duration) -> AddonInstance {
    AddonInstance {
        metadata: ObjectMeta {
            name: Some("addon-instance".to_string()),
            namespace: Some("my-addon".to_string()),
            generation: Some(1),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: AddonInstanceSpec {
            heartbeat_update_period: period,
        },
        status: None,
    }
}

/// In-memory InstanceStore with resourceVersion checks, call counters and fault injection
pub struct FakeInstanceStore {
    instance: Mutex<AddonInstance>,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
    heartbeats: Mutex<Vec<Time>>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct Faults {
    fail_gets: bool,
    /// Successful updates left before updates start failing
    updates_left: Option<usize>,
    conflicts: usize,
    delay: Option<Duration>,
    cancel_on_update: Option<CancellationToken>,
}

impl FakeInstanceStore {
    pub fn new(instance: AddonInstance) -> Self {
        Self {
            instance: Mutex::new(instance),
            get_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            heartbeats: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn instance(&self) -> AddonInstance {
        self.instance.lock().unwrap().clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.get_calls.store(0, Ordering::SeqCst);
        self.update_calls.store(0, Ordering::SeqCst);
    }

    /// `lastHeartbeatTime` of every successful status write
    pub fn heartbeat_times(&self) -> Vec<Time> {
        self.heartbeats.lock().unwrap().clone()
    }

    /// Change the spec's heartbeat period as the platform would
    pub fn set_period(&self, period: Duration) {
        let mut instance = self.instance.lock().unwrap();
        instance.spec.heartbeat_update_period = period;
        bump_resource_version(&mut instance);
    }

    /// Overwrite the stored conditions as another writer would
    pub fn set_conditions(&self, conditions: Vec<HealthCondition>) {
        let mut instance = self.instance.lock().unwrap();
        instance.status.get_or_insert_with(Default::default).conditions = conditions;
        bump_resource_version(&mut instance);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.faults.lock().unwrap().fail_gets = fail;
    }

    /// Let `n` more updates succeed, then fail every update
    pub fn fail_updates_after(&self, n: usize) {
        self.faults.lock().unwrap().updates_left = Some(n);
    }

    /// Reject the next `n` updates with a conflict
    pub fn inject_conflicts(&self, n: usize) {
        self.faults.lock().unwrap().conflicts = n;
    }

    /// Delay every call by `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.faults.lock().unwrap().delay = Some(delay);
    }

    /// Calls made from now on are answered right away; calls already waiting keep waiting
    pub fn clear_delay(&self) {
        self.faults.lock().unwrap().delay = None;
    }

    /// Cancel `token` right after the next successful update is applied
    pub fn cancel_on_update(&self, token: CancellationToken) {
        self.faults.lock().unwrap().cancel_on_update = Some(token);
    }

    fn delay(&self) -> Option<Duration> {
        self.faults.lock().unwrap().delay
    }

    fn key(instance: &AddonInstance) -> InstanceKey {
        InstanceKey::new(
            instance.metadata.name.clone().unwrap_or_default(),
            instance.metadata.namespace.clone().unwrap_or_default(),
        )
    }
}

fn bump_resource_version(instance: &mut AddonInstance) {
    let current: u64 = instance
        .metadata
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse().ok())
        .unwrap_or_default();
    instance.metadata.resource_version = Some((current + 1).to_string());
}

#[async_trait]
impl InstanceStore for FakeInstanceStore {
    async fn get(&self, key: &InstanceKey) -> Result<AddonInstance, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        if self.faults.lock().unwrap().fail_gets {
            return Err(StoreError::Unavailable("injected get failure".to_string()));
        }

        let instance = self.instance();
        if Self::key(&instance) != *key {
            return Err(StoreError::NotFound(key.clone()));
        }
        Ok(instance)
    }

    async fn update_status(&self, instance: &AddonInstance) -> Result<(), StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let cancel = {
            let mut faults = self.faults.lock().unwrap();
            if faults.conflicts > 0 {
                faults.conflicts -= 1;
                return Err(StoreError::Conflict(Self::key(instance)));
            }
            match faults.updates_left {
                Some(0) => {
                    return Err(StoreError::Unavailable("injected update failure".to_string()))
                }
                Some(n) => faults.updates_left = Some(n - 1),
                None => {}
            }
            faults.cancel_on_update.take()
        };

        {
            let mut stored = self.instance.lock().unwrap();
            if stored.metadata.resource_version != instance.metadata.resource_version {
                return Err(StoreError::Conflict(Self::key(instance)));
            }
            stored.status = instance.status.clone();
            bump_resource_version(&mut stored);
        }

        if let Some(time) = instance.last_heartbeat_time() {
            self.heartbeats.lock().unwrap().push(time.clone());
        }
        if let Some(token) = cancel {
            token.cancel();
        }
        Ok(())
    }
}
