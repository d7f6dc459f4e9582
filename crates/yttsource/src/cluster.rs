//! Access to the Kubernetes API.
//!
//! The reconciler and the source resolver only talk to the cluster through
//! the [`Cluster`] trait, so tests can substitute an in-memory fake.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;

use crate::api::{Bucket, GitRepository, OCIRepository, SourceStatus, YttSource, YttSourceStatus};
use crate::error::ClusterError;
use crate::reference::{ObjectKey, ReferenceKind};

/// Read and status-write access to the objects the controller works with.
///
/// Lookups return `Ok(None)` when the object does not exist.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn get_source(&self, key: &ObjectKey) -> Result<Option<YttSource>, ClusterError>;

    /// Writes `status` to `source`. Implementations must fail when `source`
    /// is stale rather than overwrite a newer version.
    async fn patch_status(
        &self,
        source: &YttSource,
        status: &YttSourceStatus,
    ) -> Result<(), ClusterError>;

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, ClusterError>;

    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<Secret>, ClusterError>;

    /// Status of a Flux source. A source without a status yields the
    /// default (artifact-less) status.
    async fn get_artifact_source(
        &self,
        kind: ReferenceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SourceStatus>, ClusterError>;
}

/// [`Cluster`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

pub const FIELD_MANAGER: &str = "yttsource-controller";

/// Merge patch replacing the status of `source`.
///
/// The resource version is included so the API server rejects the write if
/// the object changed since it was read. Absent fields are sent as explicit
/// nulls so stale values are cleared.
pub fn status_patch(source: &YttSource, status: &YttSourceStatus) -> serde_json::Value {
    let resources = (!status.resources.is_empty()).then_some(&status.resources);
    json!({
        "apiVersion": YttSource::api_version(&()),
        "kind": YttSource::kind(&()),
        "metadata": {
            "resourceVersion": source.resource_version(),
        },
        "status": {
            "resources": resources,
            "failureMessage": status.failure_message,
        },
    })
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get_source(&self, key: &ObjectKey) -> Result<Option<YttSource>, ClusterError> {
        let api: Api<YttSource> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn patch_status(
        &self,
        source: &YttSource,
        status: &YttSourceStatus,
    ) -> Result<(), ClusterError> {
        let namespace = source.namespace().unwrap_or_default();
        let api: Api<YttSource> = Api::namespaced(self.client.clone(), &namespace);
        let patch = status_patch(source, status);
        api.patch_status(
            &source.name_any(),
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, ClusterError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_artifact_source(
        &self,
        kind: ReferenceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SourceStatus>, ClusterError> {
        let client = self.client.clone();
        let status = match kind {
            ReferenceKind::GitRepository => Api::<GitRepository>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .map(|obj| obj.status.unwrap_or_default()),
            ReferenceKind::OCIRepository => Api::<OCIRepository>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .map(|obj| obj.status.unwrap_or_default()),
            ReferenceKind::Bucket => Api::<Bucket>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .map(|obj| obj.status.unwrap_or_default()),
            ReferenceKind::ConfigMap | ReferenceKind::Secret => {
                return Err(ClusterError::Unsupported(format!(
                    "{} does not publish artifacts",
                    kind
                )))
            }
        };
        Ok(status)
    }
}
