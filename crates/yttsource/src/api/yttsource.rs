//! The YttSource custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a YttSource: which object holds the ytt sources and
/// where inside it rendering starts.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "extension.projectsveltos.io",
    version = "v1alpha1",
    kind = "YttSource",
    plural = "yttsources",
    namespaced,
    status = "YttSourceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct YttSourceSpec {
    /// Namespace of the referenced object. Empty means the YttSource's own
    /// namespace.
    #[serde(default)]
    pub namespace: String,

    /// Name of the referenced object.
    pub name: String,

    /// Kind of the referenced object: GitRepository, OCIRepository, Bucket,
    /// ConfigMap or Secret.
    pub kind: String,

    /// Directory inside the source to render. Empty renders the root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

/// Observed state of a YttSource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YttSourceStatus {
    /// Output of ytt: the multi-document YAML to be deployed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resources: String,

    /// Why the last reconciliation failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl YttSourceStatus {
    pub fn rendered(resources: impl Into<String>) -> Self {
        Self {
            resources: resources.into(),
            failure_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            resources: String::new(),
            failure_message: Some(message.into()),
        }
    }
}

impl YttSource {
    /// Returns true once the API server has stamped a deletion timestamp.
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_spec() {
        let yaml = r#"
apiVersion: extension.projectsveltos.io/v1alpha1
kind: YttSource
metadata:
  name: render
  namespace: apps
spec:
  name: manifests
  kind: ConfigMap
"#;
        let source: YttSource = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.spec.name, "manifests");
        assert_eq!(source.spec.kind, "ConfigMap");
        assert!(source.spec.namespace.is_empty());
        assert!(source.spec.path.is_empty());
        assert!(source.status.is_none());
        assert!(!source.is_being_deleted());
    }

    #[test]
    fn test_status_serialization_uses_camel_case() {
        let status = YttSourceStatus::failed("boom");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["failureMessage"], "boom");
        assert!(json.get("resources").is_none());

        let status = YttSourceStatus::rendered("a: 1\n");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["resources"], "a: 1\n");
        assert!(json.get("failureMessage").is_none());
    }
}
