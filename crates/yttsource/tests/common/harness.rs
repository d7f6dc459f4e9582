//! Test harness wiring a reconciler to in-memory fakes.

#![allow(dead_code)]

use std::sync::Arc;

use yttsource::config::{ControllerConfig, TemplateEngineKind};
use yttsource::index::ReferenceIndex;
use yttsource::reconciler::{ReconcileOutcome, YttSourceReconciler};
use yttsource::reference::ObjectKey;
use yttsource::source::SourceResolver;
use yttsource::template::{PlainYamlEngine, TemplateEngine, TemplateRenderer};
use yttsource::ReconcileError;

use super::cluster::FakeCluster;
use super::fetcher::RecordingFetcher;

pub struct TestHarness {
    pub cluster: Arc<FakeCluster>,
    pub fetcher: Arc<RecordingFetcher>,
    pub index: Arc<ReferenceIndex>,
    pub config: ControllerConfig,
    pub reconciler: YttSourceReconciler,
}

impl TestHarness {
    /// Harness rendering with the plain YAML engine.
    pub fn new() -> Self {
        Self::with_config(ControllerConfig {
            template_engine: TemplateEngineKind::Plain,
            ..Default::default()
        })
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        Self::with_engine(config, Arc::new(PlainYamlEngine))
    }

    pub fn with_engine(config: ControllerConfig, engine: Arc<dyn TemplateEngine>) -> Self {
        let cluster = Arc::new(FakeCluster::new());
        let fetcher = Arc::new(RecordingFetcher::new());
        let index = Arc::new(ReferenceIndex::new());

        let resolver = SourceResolver::new(cluster.clone(), fetcher.clone(), &config);
        let reconciler = YttSourceReconciler::new(
            cluster.clone(),
            index.clone(),
            resolver,
            TemplateRenderer::new(engine),
            &config,
        );

        Self {
            cluster,
            fetcher,
            index,
            config,
            reconciler,
        }
    }

    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconciler
            .reconcile(&ObjectKey::new(namespace, name))
            .await
    }

    /// Failure message recorded for a YttSource, if any.
    pub fn failure_of(&self, namespace: &str, name: &str) -> Option<String> {
        self.cluster
            .status_of(&ObjectKey::new(namespace, name))
            .and_then(|s| s.failure_message)
    }

    pub fn resources_of(&self, namespace: &str, name: &str) -> Option<String> {
        self.cluster
            .status_of(&ObjectKey::new(namespace, name))
            .map(|s| s.resources)
    }
}
