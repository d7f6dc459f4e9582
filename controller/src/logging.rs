//! Process-wide logging setup.
//!
//! Library code logs through both `tracing` (reconcile spans) and `log`
//! (watch and filter paths). A single `tracing` subscriber receives both;
//! `log` records are forwarded by `LogTracer`.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "yttsource=info,yttsource_controller=info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
