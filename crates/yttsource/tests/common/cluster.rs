//! In-memory `Cluster` implementation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::ResourceExt;

use yttsource::api::{SourceStatus, YttSource, YttSourceStatus};
use yttsource::cluster::Cluster;
use yttsource::error::ClusterError;
use yttsource::reference::{ObjectKey, ReferenceKind};

type Named = (String, String);

/// Objects keyed by namespace and name, plus a log of status patches.
#[derive(Default)]
pub struct FakeCluster {
    sources: Mutex<HashMap<ObjectKey, YttSource>>,
    config_maps: Mutex<HashMap<Named, ConfigMap>>,
    secrets: Mutex<HashMap<Named, Secret>>,
    artifact_sources: Mutex<HashMap<(ReferenceKind, String, String), SourceStatus>>,
    patches: Mutex<Vec<(ObjectKey, YttSourceStatus)>>,
    fail_patches: AtomicBool,
}

fn named<K: kube::Resource>(obj: &K) -> Named {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_source(&self, source: YttSource) {
        let key = ObjectKey::from_resource(&source);
        self.sources.lock().unwrap().insert(key, source);
    }

    pub fn delete_source(&self, key: &ObjectKey) {
        self.sources.lock().unwrap().remove(key);
    }

    pub fn put_config_map(&self, cm: ConfigMap) {
        self.config_maps.lock().unwrap().insert(named(&cm), cm);
    }

    pub fn put_secret(&self, secret: Secret) {
        self.secrets.lock().unwrap().insert(named(&secret), secret);
    }

    /// Registers a Flux source with the given status.
    pub fn put_artifact_source(
        &self,
        kind: ReferenceKind,
        namespace: &str,
        name: &str,
        status: SourceStatus,
    ) {
        self.artifact_sources
            .lock()
            .unwrap()
            .insert((kind, namespace.to_string(), name.to_string()), status);
    }

    pub fn fail_patches(&self, fail: bool) {
        self.fail_patches.store(fail, Ordering::SeqCst);
    }

    pub fn patches(&self) -> Vec<(ObjectKey, YttSourceStatus)> {
        self.patches.lock().unwrap().clone()
    }

    /// Status most recently written for `key`.
    pub fn status_of(&self, key: &ObjectKey) -> Option<YttSourceStatus> {
        self.sources
            .lock()
            .unwrap()
            .get(key)
            .and_then(|s| s.status.clone())
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get_source(&self, key: &ObjectKey) -> Result<Option<YttSource>, ClusterError> {
        Ok(self.sources.lock().unwrap().get(key).cloned())
    }

    async fn patch_status(
        &self,
        source: &YttSource,
        status: &YttSourceStatus,
    ) -> Result<(), ClusterError> {
        let key = ObjectKey::from_resource(source);
        if self.fail_patches.load(Ordering::SeqCst) {
            return Err(ClusterError::Conflict(key.to_string()));
        }

        self.patches
            .lock()
            .unwrap()
            .push((key.clone(), status.clone()));
        if let Some(stored) = self.sources.lock().unwrap().get_mut(&key) {
            stored.status = Some(status.clone());
        }
        Ok(())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, ClusterError> {
        Ok(self
            .config_maps
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ClusterError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_artifact_source(
        &self,
        kind: ReferenceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SourceStatus>, ClusterError> {
        Ok(self
            .artifact_sources
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }
}
