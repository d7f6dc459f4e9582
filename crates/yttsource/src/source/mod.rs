//! Materialises the object a YttSource references into a staging directory.
//!
//! ConfigMaps and Secrets carry a gzip-compressed tarball under
//! [`PAYLOAD_KEY`]. Flux sources publish an artifact URL which is downloaded
//! through an [`ArtifactFetcher`]. Either way the result is a [`StagingDir`]
//! owned by a single reconcile attempt and removed when dropped.

mod artifact;
mod embedded;
mod error;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

pub use artifact::{verify_digest, ArtifactFetcher, HttpArtifactFetcher};
pub use error::SourceError;

use crate::archive::Extractor;
use crate::cluster::Cluster;
use crate::config::ControllerConfig;
use crate::error::ClusterError;
use crate::reference::{ExternalReference, ReferenceKind};

/// Key holding the tarball in ConfigMap `binaryData` or Secret `data`.
pub const PAYLOAD_KEY: &str = "ytt.tar.gz";

/// The only Secret type accepted unless configured otherwise.
pub const DEFAULT_SECRET_TYPE: &str = "addons.projectsveltos.io/cluster-profile";

/// Subdirectory embedded payloads are extracted into.
pub const EXTRACTED_DIR: &str = "extracted";

/// A private temporary directory holding the files of one source.
///
/// The whole tree is deleted when the value is dropped.
#[derive(Debug)]
pub struct StagingDir {
    root: TempDir,
    content: PathBuf,
}

impl StagingDir {
    pub(crate) fn new(reference: &ExternalReference) -> io::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix(&format!("ytt-{}-{}-", reference.namespace, reference.name))
            .tempdir()?;
        let content = root.path().to_path_buf();
        Ok(Self { root, content })
    }

    /// Directory holding the source files.
    pub fn path(&self) -> &Path {
        &self.content
    }

    /// Top of the temporary tree.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn set_content_dir(&mut self, content: PathBuf) {
        self.content = content;
    }

    /// Removes the tree now, reporting failures instead of ignoring them.
    pub fn close(self) -> io::Result<()> {
        self.root.close()
    }
}

/// Produces a [`StagingDir`] for any supported reference.
pub struct SourceResolver {
    cluster: Arc<dyn Cluster>,
    fetcher: Arc<dyn ArtifactFetcher>,
    extractor: Extractor,
    secret_type: String,
}

impl SourceResolver {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        fetcher: Arc<dyn ArtifactFetcher>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            cluster,
            fetcher,
            extractor: Extractor::new(config.max_entry_size),
            secret_type: config.secret_type.clone(),
        }
    }

    pub async fn resolve(&self, reference: &ExternalReference) -> Result<StagingDir, SourceError> {
        let kind = reference
            .reference_kind()
            .ok_or_else(|| SourceError::UnsupportedKind(reference.kind.clone()))?;

        tracing::debug!(kind = %kind, namespace = %reference.namespace, name = %reference.name, "Resolving source");

        match kind {
            ReferenceKind::ConfigMap => self.resolve_config_map(reference).await,
            ReferenceKind::Secret => self.resolve_secret(reference).await,
            ReferenceKind::GitRepository | ReferenceKind::OCIRepository | ReferenceKind::Bucket => {
                self.resolve_artifact(kind, reference).await
            }
        }
    }
}

fn not_found(reference: &ExternalReference) -> SourceError {
    SourceError::SourceNotFound {
        kind: reference.kind.clone(),
        namespace: reference.namespace.clone(),
        name: reference.name.clone(),
    }
}

fn lookup_failed(reference: &ExternalReference, source: ClusterError) -> SourceError {
    SourceError::Lookup {
        kind: reference.kind.clone(),
        namespace: reference.namespace.clone(),
        name: reference.name.clone(),
        source,
    }
}
