//! Flux source-controller objects (`source.toolkit.fluxcd.io`).
//!
//! Only the parts this controller consumes are modelled: the artifact a
//! source publishes in its status once it has produced output.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An artifact published by a Flux source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// HTTP address the tarball can be downloaded from.
    pub url: String,

    /// Content digest in `<algorithm>:<hex>` form.
    #[serde(default)]
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl Artifact {
    pub fn new(url: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            digest: digest.into(),
            ..Default::default()
        }
    }

    /// The `(url, digest)` pair identifying the artifact content.
    pub fn descriptor(&self) -> (&str, &str) {
        (&self.url, &self.digest)
    }
}

/// Status shared by every Flux source kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl SourceStatus {
    pub fn with_artifact(artifact: Artifact) -> Self {
        Self {
            artifact: Some(artifact),
            observed_generation: None,
        }
    }
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "GitRepository",
    plural = "gitrepositories",
    namespaced,
    status = "SourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1beta2",
    kind = "OCIRepository",
    plural = "ocirepositories",
    namespaced,
    status = "SourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct OCIRepositorySpec {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1beta2",
    kind = "Bucket",
    plural = "buckets",
    namespaced,
    status = "SourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// Access to the artifact of any Flux source kind.
pub trait ArtifactSource {
    fn artifact(&self) -> Option<&Artifact>;
}

macro_rules! impl_artifact_source {
    ($($kind:ty),+) => {
        $(
            impl ArtifactSource for $kind {
                fn artifact(&self) -> Option<&Artifact> {
                    self.status.as_ref().and_then(|s| s.artifact.as_ref())
                }
            }
        )+
    };
}

impl_artifact_source!(GitRepository, OCIRepository, Bucket);
