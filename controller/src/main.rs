mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client};

use yttsource::config::{load_config_layers, ControllerConfig, TemplateEngineKind};
use yttsource::{Controller, ReferenceKind};

use logging::LogFormat;

/// CRD whose presence means Flux source-controller is installed.
const FLUX_SOURCE_CRD: &str = "gitrepositories.source.toolkit.fluxcd.io";
const FLUX_DETECTION_ATTEMPTS: u32 = 20;

#[derive(Debug, Parser)]
#[command(name = "yttsource-controller", version, about = "Renders YttSource objects with ytt")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, env = "YTTSOURCE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of YttSources reconciled in parallel.
    #[arg(long)]
    concurrent_reconciles: Option<u16>,

    /// Seconds between periodic re-renders of a healthy YttSource.
    #[arg(long)]
    sync_period_secs: Option<u64>,

    /// Template engine: ytt or plain.
    #[arg(long)]
    template_engine: Option<TemplateEngineKind>,

    /// Path of the ytt binary.
    #[arg(long)]
    ytt_binary: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    /// File, then environment, then flags; validated once at the end.
    fn resolve_config(&self) -> Result<ControllerConfig, yttsource::ConfigError> {
        let mut config = load_config_layers(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut ControllerConfig) {
        if let Some(concurrency) = self.concurrent_reconciles {
            config.concurrency = concurrency;
        }
        if let Some(secs) = self.sync_period_secs {
            config.sync_period_secs = secs;
        }
        if let Some(engine) = self.template_engine {
            config.template_engine = engine;
        }
        if let Some(binary) = &self.ytt_binary {
            config.ytt_binary = binary.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format)?;

    let config = cli.resolve_config().context("failed to load configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        concurrency = config.concurrency,
        sync_period_secs = config.sync_period_secs,
        engine = %config.template_engine,
        "Starting yttsource-controller"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let controller = Controller::new(client.clone(), config)?;
    controller.register_kind(ReferenceKind::ConfigMap);
    controller.register_kind(ReferenceKind::Secret);

    if flux_installed(&client).await? {
        for kind in ReferenceKind::flux() {
            controller.register_kind(*kind);
        }
    } else {
        tracing::info!("Flux source-controller not installed, Flux sources will not be watched");
    }

    controller.run().await;
    Ok(())
}

/// Looks for the Flux GitRepository CRD, retrying transient API errors.
async fn flux_installed(client: &Client) -> anyhow::Result<bool> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    let mut attempt = 0;
    loop {
        attempt += 1;
        match crds.get_opt(FLUX_SOURCE_CRD).await {
            Ok(found) => return Ok(found.is_some()),
            Err(e) if attempt < FLUX_DETECTION_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "Failed to look up Flux CRD, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => {
                return Err(e).context(format!(
                    "failed to detect Flux after {} attempts",
                    FLUX_DETECTION_ATTEMPTS
                ))
            }
        }
    }
}
