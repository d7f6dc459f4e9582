//! One reconciliation of one YttSource.
//!
//! Load the object, record what it references, materialise the referenced
//! source, render it and write the outcome to the status. Source and render
//! failures are recorded in the status and are not errors of the reconcile
//! itself; only failing to load or patch the object is.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info_span, Instrument};

use crate::api::{YttSource, YttSourceStatus};
use crate::cluster::Cluster;
use crate::config::ControllerConfig;
use crate::error::ReconcileError;
use crate::index::ReferenceIndex;
use crate::reference::{ExternalReference, ObjectKey};
use crate::source::{SourceError, SourceResolver};
use crate::template::TemplateRenderer;

/// What a reconcile did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The YttSource no longer exists.
    Gone,
    /// The YttSource is being deleted.
    Deleted,
    /// Rendering succeeded and the output was recorded.
    Rendered,
    /// Rendering failed and the reason was recorded.
    Failed {
        message: String,
        /// Set when the referenced backend is missing or not ready yet.
        awaiting_backend: bool,
    },
}

pub struct YttSourceReconciler {
    cluster: Arc<dyn Cluster>,
    index: Arc<ReferenceIndex>,
    resolver: SourceResolver,
    renderer: TemplateRenderer,
    operation_timeout: Duration,
}

impl YttSourceReconciler {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        index: Arc<ReferenceIndex>,
        resolver: SourceResolver,
        renderer: TemplateRenderer,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            cluster,
            index,
            resolver,
            renderer,
            operation_timeout: config.operation_timeout(),
        }
    }

    pub fn index(&self) -> &Arc<ReferenceIndex> {
        &self.index
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let span = info_span!("reconcile", yttsource = %key);
        self.reconcile_inner(key).instrument(span).await
    }

    async fn reconcile_inner(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let source = match self.cluster.get_source(key).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                tracing::debug!("YttSource not found, dropping its reference");
                self.index.remove(key);
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch YttSource");
                return Err(ReconcileError::Load {
                    key: key.clone(),
                    source: e,
                });
            }
        };

        if source.is_being_deleted() {
            tracing::info!("YttSource is being deleted");
            self.index.remove(key);
            return Ok(ReconcileOutcome::Deleted);
        }

        let reference = ExternalReference::for_source(&source);
        self.index.upsert(key, reference.clone());

        let (status, outcome) = match self.render_source(key, &source, &reference).await {
            Ok(resources) => {
                tracing::info!(source = %reference, bytes = resources.len(), "Rendered YttSource");
                (YttSourceStatus::rendered(resources), ReconcileOutcome::Rendered)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(source = %reference, error = %message, "Failed to render YttSource");
                (
                    YttSourceStatus::failed(message.clone()),
                    ReconcileOutcome::Failed {
                        message,
                        awaiting_backend: e.awaits_backend(),
                    },
                )
            }
        };

        if let Err(e) = self.cluster.patch_status(&source, &status).await {
            tracing::error!(error = %e, "Failed to update YttSource status");
            return Err(ReconcileError::Patch {
                key: key.clone(),
                source: e,
            });
        }

        Ok(outcome)
    }

    async fn render_source(
        &self,
        key: &ObjectKey,
        source: &YttSource,
        reference: &ExternalReference,
    ) -> Result<String, SourceError> {
        if source.spec.name.is_empty() {
            return Err(SourceError::InvalidSpec("spec.name must not be empty".to_string()));
        }

        let staging = with_timeout(
            "resolve",
            self.operation_timeout,
            self.resolver
                .resolve(reference)
                .instrument(info_span!("resolve", kind = %reference.kind)),
        )
        .await?;

        let rendered = with_timeout(
            "render",
            self.operation_timeout,
            self.renderer
                .render(staging.path(), &source.spec.path, key)
                .instrument(info_span!("render", path = %source.spec.path)),
        )
        .await;

        if let Err(e) = staging.close() {
            tracing::warn!(error = %e, "Failed to remove staging directory");
        }

        rendered
    }
}

async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SourceError::Timeout { operation, limit })?
}
