//! Decides which backend changes warrant reconciling dependents.
//!
//! Only changes to the payload a YttSource consumes count: the embedded
//! tarball of a ConfigMap or Secret, or the artifact of a Flux source.
//! Label, annotation and status churn elsewhere is ignored.

use std::fmt::Debug;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::api::{Artifact, ArtifactSource, Bucket, GitRepository, OCIRepository};
use crate::reference::{ExternalReference, ReferenceKind};

/// A change observed on a watched backend object.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent<K> {
    Created(K),
    Updated { old: K, new: K },
    Deleted(K),
    /// Out-of-band notification with no state change.
    Generic(K),
}

impl<K> BackendEvent<K> {
    /// The current object, or the last known one for deletions.
    pub fn object(&self) -> &K {
        match self {
            BackendEvent::Created(obj) | BackendEvent::Deleted(obj) | BackendEvent::Generic(obj) => obj,
            BackendEvent::Updated { new, .. } => new,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BackendEvent::Created(_) => "create",
            BackendEvent::Updated { .. } => "update",
            BackendEvent::Deleted(_) => "delete",
            BackendEvent::Generic(_) => "generic",
        }
    }
}

/// A backend kind the controller watches.
pub trait BackendObject:
    Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ReferenceKind;

    /// Whether an update changed what dependents consume.
    fn update_is_relevant(old: &Self, new: &Self) -> bool;

    fn external_reference(&self) -> ExternalReference {
        ExternalReference::new(Self::KIND, self.namespace().unwrap_or_default(), self.name_any())
    }
}

impl BackendObject for ConfigMap {
    const KIND: ReferenceKind = ReferenceKind::ConfigMap;

    fn update_is_relevant(old: &Self, new: &Self) -> bool {
        old.binary_data != new.binary_data
    }
}

impl BackendObject for Secret {
    const KIND: ReferenceKind = ReferenceKind::Secret;

    fn update_is_relevant(old: &Self, new: &Self) -> bool {
        old.data != new.data
    }
}

macro_rules! impl_flux_backend {
    ($($kind:ident),+) => {
        $(
            impl BackendObject for $kind {
                const KIND: ReferenceKind = ReferenceKind::$kind;

                fn update_is_relevant(old: &Self, new: &Self) -> bool {
                    artifact_changed(old.artifact(), new.artifact())
                }
            }
        )+
    };
}

impl_flux_backend!(GitRepository, OCIRepository, Bucket);

/// Compares two artifacts by URL and digest.
pub fn artifact_changed(old: Option<&Artifact>, new: Option<&Artifact>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(old), Some(new)) => old.descriptor() != new.descriptor(),
        _ => true,
    }
}

pub fn is_reconcile_worthy<K: BackendObject>(event: &BackendEvent<K>) -> bool {
    let worthy = match event {
        BackendEvent::Created(_) | BackendEvent::Deleted(_) => true,
        BackendEvent::Updated { old, new } => K::update_is_relevant(old, new),
        BackendEvent::Generic(_) => false,
    };

    log::trace!(
        "{} {} of {}: {}",
        K::KIND,
        event.label(),
        event.object().name_any(),
        if worthy { "reconciling dependents" } else { "ignored" }
    );
    worthy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GitRepositorySpec, SourceStatus};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn config_map(binary: Option<&[u8]>, labels: &[(&str, &str)]) -> ConfigMap {
        let mut cm = ConfigMap::default();
        cm.metadata.name = Some("bundle".into());
        cm.metadata.namespace = Some("apps".into());
        cm.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        cm.binary_data = binary.map(|b| {
            let mut data = BTreeMap::new();
            data.insert("ytt.tar.gz".to_string(), ByteString(b.to_vec()));
            data
        });
        cm
    }

    fn git_repo(artifact: Option<Artifact>) -> GitRepository {
        let mut repo = GitRepository::new("podinfo", GitRepositorySpec::default());
        repo.metadata.namespace = Some("flux-system".into());
        repo.status = artifact.map(SourceStatus::with_artifact);
        repo
    }

    #[test]
    fn test_create_and_delete_always_count() {
        assert!(is_reconcile_worthy(&BackendEvent::Created(config_map(None, &[]))));
        assert!(is_reconcile_worthy(&BackendEvent::Deleted(config_map(None, &[]))));
        assert!(!is_reconcile_worthy(&BackendEvent::Generic(config_map(None, &[]))));
    }

    #[test]
    fn test_config_map_label_change_ignored() {
        let event = BackendEvent::Updated {
            old: config_map(Some(b"v1"), &[("team", "a")]),
            new: config_map(Some(b"v1"), &[("team", "b")]),
        };
        assert!(!is_reconcile_worthy(&event));
    }

    #[test]
    fn test_config_map_payload_change() {
        let event = BackendEvent::Updated {
            old: config_map(Some(b"v1"), &[]),
            new: config_map(Some(b"v2"), &[]),
        };
        assert!(is_reconcile_worthy(&event));
    }

    #[test]
    fn test_config_map_plain_data_ignored() {
        let old = config_map(Some(b"v1"), &[]);
        let mut new = old.clone();
        new.data = Some(BTreeMap::from([("note".to_string(), "hi".to_string())]));
        assert!(!is_reconcile_worthy(&BackendEvent::Updated { old, new }));
    }

    #[test]
    fn test_secret_data_change() {
        let mut old = Secret::default();
        old.metadata.name = Some("s".into());
        let mut new = old.clone();
        new.data = Some(BTreeMap::from([("ytt.tar.gz".to_string(), ByteString(vec![1]))]));
        assert!(!is_reconcile_worthy(&BackendEvent::Updated {
            old: old.clone(),
            new: old.clone(),
        }));
        assert!(is_reconcile_worthy(&BackendEvent::Updated { old, new }));
    }

    #[test]
    fn test_flux_artifact_changes() {
        let a1 = Artifact::new("http://sc/a.tar.gz", "sha256:1");
        let a2 = Artifact::new("http://sc/a.tar.gz", "sha256:2");

        let becomes_ready = BackendEvent::Updated {
            old: git_repo(None),
            new: git_repo(Some(a1.clone())),
        };
        assert!(is_reconcile_worthy(&becomes_ready));

        let new_digest = BackendEvent::Updated {
            old: git_repo(Some(a1.clone())),
            new: git_repo(Some(a2)),
        };
        assert!(is_reconcile_worthy(&new_digest));

        let mut revised = a1.clone();
        revised.last_update_time = Some("2024-01-02T00:00:00Z".into());
        let same_content = BackendEvent::Updated {
            old: git_repo(Some(a1)),
            new: git_repo(Some(revised)),
        };
        assert!(!is_reconcile_worthy(&same_content));

        let still_not_ready = BackendEvent::Updated {
            old: git_repo(None),
            new: git_repo(None),
        };
        assert!(!is_reconcile_worthy(&still_not_ready));
    }

    #[test]
    fn test_external_reference_of_backend() {
        let reference = git_repo(None).external_reference();
        assert_eq!(
            reference,
            ExternalReference::new(ReferenceKind::GitRepository, "flux-system", "podinfo")
        );
    }
}
