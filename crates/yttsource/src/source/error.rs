use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::{ArchiveError, ClusterError};

/// Why a YttSource could not be rendered.
///
/// The `Display` output is what lands in `status.failureMessage`.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{kind} {namespace}/{name} not found")]
    SourceNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} is not ready: no artifact published")]
    SourceNotReady {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{key} missing")]
    MissingPayload { key: String },

    #[error("secret type {found:?} not supported, expected {expected:?}")]
    UnsupportedSecretType { found: String, expected: String },

    #[error("source kind {0:?} not supported")]
    UnsupportedKind(String),

    #[error("invalid YttSource spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("path {0:?} escapes the source directory")]
    PathEscape(String),

    #[error("ytt path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("{0}")]
    Template(String),

    #[error("failed to fetch artifact {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("artifact digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("unsupported artifact digest {0:?}")]
    UnsupportedDigest(String),

    #[error("{operation} timed out after {}s", .limit.as_secs())]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("failed to read {kind} {namespace}/{name}: {source}")]
    Lookup {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("staging directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether the backend is expected to appear or become ready soon, so
    /// a short requeue is worthwhile.
    pub fn awaits_backend(&self) -> bool {
        matches!(
            self,
            SourceError::SourceNotFound { .. } | SourceError::SourceNotReady { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            SourceError::MissingPayload {
                key: "ytt.tar.gz".into()
            }
            .to_string(),
            "ytt.tar.gz missing"
        );
        assert_eq!(
            SourceError::Timeout {
                operation: "render",
                limit: Duration::from_secs(120)
            }
            .to_string(),
            "render timed out after 120s"
        );
        let archive = SourceError::from(ArchiveError::PathEscape {
            entry: "../x".into(),
        });
        assert_eq!(
            archive.to_string(),
            "tar archive entry \"../x\" is outside of destination directory"
        );
    }

    #[test]
    fn test_classification() {
        let not_ready = SourceError::SourceNotReady {
            kind: "GitRepository".into(),
            namespace: "flux-system".into(),
            name: "podinfo".into(),
        };
        assert!(not_ready.awaits_backend());

        let template = SourceError::Template("syntax error".into());
        assert!(!template.awaits_backend());

        let fetch = SourceError::Fetch {
            url: "http://x".into(),
            message: "connection refused".into(),
        };
        assert!(!fetch.awaits_backend());
    }
}
