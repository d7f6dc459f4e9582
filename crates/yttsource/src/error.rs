//! Error types shared across the controller.
//!
//! Source resolution and rendering failures live in
//! [`crate::source::SourceError`]; they end up in the YttSource status rather
//! than in the reconcile result.

use std::path::PathBuf;

use thiserror::Error;

use crate::reference::ObjectKey;

/// Errors raised while unpacking a tar.gz payload.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read archive: {0}")]
    Read(#[source] std::io::Error),

    #[error("tar archive entry {entry:?} is outside of destination directory")]
    PathEscape { entry: String },

    #[error("tar archive entry {entry:?} exceeds the {limit} byte size limit")]
    EntryTooLarge { entry: String, limit: u64 },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors talking to the Kubernetes API.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Kubernetes API request failed: {0}")]
    Kube(#[source] kube::Error),

    #[error("Conflicting update of {0}")]
    Conflict(String),

    #[error("{0}")]
    Unsupported(String),
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 409 => {
                ClusterError::Conflict(response.message.clone())
            }
            _ => ClusterError::Kube(err),
        }
    }
}

/// Hard reconcile errors. These are returned to the work queue and retried
/// with the error backoff; they never reach the YttSource status.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to fetch YttSource {key}: {source}")]
    Load {
        key: ObjectKey,
        #[source]
        source: ClusterError,
    },

    #[error("Failed to update status of YttSource {key}: {source}")]
    Patch {
        key: ObjectKey,
        #[source]
        source: ClusterError,
    },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Invalid value {value:?} for {name}: {message}")]
    InvalidEnv {
        name: String,
        value: String,
        message: String,
    },

    #[error("Config validation error: {message}")]
    Validation { message: String },
}

/// Errors raised while wiring the controller together.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
