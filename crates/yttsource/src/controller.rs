//! Wires the reconciler into the kube-runtime controller loop.
//!
//! The loop is triggered by YttSource changes and by reconcile requests the
//! backend watches push onto the queue. It owns the work queue, which never
//! runs two reconciles of the same YttSource at once.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::{watcher, Controller as KubeController};
use kube::{Api, Client};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::YttSource;
use crate::cluster::{Cluster, KubeCluster};
use crate::config::{ControllerConfig, TemplateEngineKind};
use crate::error::{ReconcileError, StartupError};
use crate::index::ReferenceIndex;
use crate::reconciler::{ReconcileOutcome, YttSourceReconciler};
use crate::reference::{ObjectKey, ReferenceKind};
use crate::source::{ArtifactFetcher, HttpArtifactFetcher, SourceResolver};
use crate::template::{PlainYamlEngine, TemplateEngine, TemplateRenderer, YttEngine};
use crate::watch::{spawn_source_cleanup, WatchRegistry};

/// Shared state handed to every reconcile.
pub struct Context {
    reconciler: YttSourceReconciler,
    config: ControllerConfig,
}

/// The running controller: reconciler, backend watches and work queue.
pub struct Controller {
    client: Client,
    context: Arc<Context>,
    registry: WatchRegistry,
    queue: mpsc::Receiver<kube::runtime::reflector::ObjectRef<YttSource>>,
}

impl Controller {
    pub fn new(client: Client, config: ControllerConfig) -> Result<Self, StartupError> {
        config.validate()?;

        let index = Arc::new(ReferenceIndex::new());
        let cluster: Arc<dyn Cluster> = Arc::new(KubeCluster::new(client.clone()));
        let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(HttpArtifactFetcher::new(&config)?);
        let engine: Arc<dyn TemplateEngine> = match config.template_engine {
            TemplateEngineKind::Ytt => Arc::new(YttEngine::new(config.ytt_binary.clone())),
            TemplateEngineKind::Plain => Arc::new(PlainYamlEngine),
        };

        let resolver = SourceResolver::new(Arc::clone(&cluster), fetcher, &config);
        let renderer = TemplateRenderer::new(engine);
        let reconciler =
            YttSourceReconciler::new(cluster, Arc::clone(&index), resolver, renderer, &config);

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let registry = WatchRegistry::new(client.clone(), index, tx);

        Ok(Self {
            client,
            context: Arc::new(Context { reconciler, config }),
            registry,
            queue: rx,
        })
    }

    /// Starts watching a backend kind. Idempotent.
    pub fn register_kind(&self, kind: ReferenceKind) -> bool {
        self.registry.register(kind)
    }

    /// Runs until a termination signal is received.
    pub async fn run(self) {
        let Controller {
            client,
            context,
            registry,
            queue,
        } = self;

        let cleanup = spawn_source_cleanup(
            Api::all(client.clone()),
            Arc::clone(context.reconciler.index()),
        );

        tracing::info!(
            concurrency = context.config.concurrency,
            engine = %context.config.template_engine,
            "Starting YttSource controller"
        );

        let concurrency = context.config.concurrency;
        KubeController::new(Api::<YttSource>::all(client), watcher::Config::default())
            .with_config(controller::Config::default().concurrency(concurrency))
            .reconcile_on(ReceiverStream::new(queue))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((obj, action)) => log::debug!("Reconciled {}: {:?}", obj, action),
                    Err(e) => log::warn!("Reconcile failed: {}", e),
                }
            })
            .await;

        cleanup.abort();
        drop(registry);
        tracing::info!("YttSource controller stopped");
    }
}

async fn reconcile(source: Arc<YttSource>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = ObjectKey::from_resource(source.as_ref());
    let outcome = ctx.reconciler.reconcile(&key).await?;
    Ok(match requeue_after(&outcome, &ctx.config) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

fn error_policy(source: Arc<YttSource>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::from_resource(source.as_ref());
    tracing::warn!(yttsource = %key, error = %error, "Requeueing after error");
    Action::requeue(ctx.config.error_requeue())
}

/// When a YttSource should be looked at again after `outcome`.
pub fn requeue_after(outcome: &ReconcileOutcome, config: &ControllerConfig) -> Option<Duration> {
    match outcome {
        ReconcileOutcome::Gone | ReconcileOutcome::Deleted => None,
        ReconcileOutcome::Rendered => Some(config.sync_period()),
        ReconcileOutcome::Failed {
            awaiting_backend: true,
            ..
        } => Some(config.not_ready_requeue()),
        ReconcileOutcome::Failed { .. } => Some(config.sync_period()),
    }
}
