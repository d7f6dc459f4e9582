pub mod api;
pub mod archive;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod index;
pub mod reconciler;
pub mod reference;
pub mod sanitize;
pub mod source;
pub mod template;
pub mod watch;

pub use api::{Artifact, SourceStatus, YttSource, YttSourceSpec, YttSourceStatus};
pub use cluster::{Cluster, KubeCluster};
pub use config::{load_config, ControllerConfig, TemplateEngineKind};
pub use controller::Controller;
pub use error::{ArchiveError, ClusterError, ConfigError, ReconcileError, StartupError};
pub use filter::{is_reconcile_worthy, BackendEvent, BackendObject};
pub use index::ReferenceIndex;
pub use reconciler::{ReconcileOutcome, YttSourceReconciler};
pub use reference::{ExternalReference, ObjectKey, ReferenceKind};
pub use source::{ArtifactFetcher, HttpArtifactFetcher, SourceError, SourceResolver, StagingDir};
pub use template::{PlainYamlEngine, TemplateEngine, TemplateRenderer, YttEngine};
pub use watch::{dependents_for_event, EventTranslator, WatchRegistry};
