//! Typed identities for the objects the controller works with.
//!
//! An [`ObjectKey`] names a YttSource. An [`ExternalReference`] names the
//! backend object a YttSource reads its ytt sources from.

use std::fmt;
use std::str::FromStr;

use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};

use crate::api::YttSource;

pub const CORE_API_VERSION: &str = "v1";
pub const FLUX_V1_API_VERSION: &str = "source.toolkit.fluxcd.io/v1";
pub const FLUX_V1BETA2_API_VERSION: &str = "source.toolkit.fluxcd.io/v1beta2";

/// The backend kinds a YttSource may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceKind {
    GitRepository,
    OCIRepository,
    Bucket,
    ConfigMap,
    Secret,
}

impl ReferenceKind {
    pub fn all() -> &'static [ReferenceKind] {
        &[
            ReferenceKind::GitRepository,
            ReferenceKind::OCIRepository,
            ReferenceKind::Bucket,
            ReferenceKind::ConfigMap,
            ReferenceKind::Secret,
        ]
    }

    /// Kinds served by Flux source-controller.
    pub fn flux() -> &'static [ReferenceKind] {
        &[
            ReferenceKind::GitRepository,
            ReferenceKind::OCIRepository,
            ReferenceKind::Bucket,
        ]
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ReferenceKind::GitRepository => FLUX_V1_API_VERSION,
            ReferenceKind::OCIRepository | ReferenceKind::Bucket => FLUX_V1BETA2_API_VERSION,
            ReferenceKind::ConfigMap | ReferenceKind::Secret => CORE_API_VERSION,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::GitRepository => "GitRepository",
            ReferenceKind::OCIRepository => "OCIRepository",
            ReferenceKind::Bucket => "Bucket",
            ReferenceKind::ConfigMap => "ConfigMap",
            ReferenceKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    /// Accepts the Kubernetes kind names as well as the generic aliases
    /// (`RepositoryArtifact`, `OCIArtifact`, `BucketArtifact`,
    /// `EmbeddedConfig`, `EmbeddedSecret`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitrepository" | "repositoryartifact" => Ok(ReferenceKind::GitRepository),
            "ocirepository" | "ociartifact" => Ok(ReferenceKind::OCIRepository),
            "bucket" | "bucketartifact" => Ok(ReferenceKind::Bucket),
            "configmap" | "embeddedconfig" => Ok(ReferenceKind::ConfigMap),
            "secret" | "embeddedsecret" => Ok(ReferenceKind::Secret),
            _ => Err(format!("Unknown source kind: {}", s)),
        }
    }
}

/// Namespaced name of a YttSource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of a backend object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalReference {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ExternalReference {
    pub fn new(kind: ReferenceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: kind.api_version().to_string(),
            kind: kind.as_str().to_string(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Computes the reference a YttSource points at.
    ///
    /// Aliased kinds are canonicalised and an empty namespace falls back to
    /// the YttSource's own. An unknown kind is kept verbatim with an empty
    /// API version, so it still indexes but never resolves.
    pub fn for_source(source: &YttSource) -> Self {
        let spec = &source.spec;
        let namespace = if spec.namespace.is_empty() {
            source.namespace().unwrap_or_default()
        } else {
            spec.namespace.clone()
        };

        match spec.kind.parse::<ReferenceKind>() {
            Ok(kind) => Self::new(kind, namespace, spec.name.clone()),
            Err(_) => Self {
                api_version: String::new(),
                kind: spec.kind.clone(),
                namespace,
                name: spec.name.clone(),
            },
        }
    }

    pub fn reference_kind(&self) -> Option<ReferenceKind> {
        self.kind.parse().ok()
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}
