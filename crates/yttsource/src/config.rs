//! Controller configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `YTTSOURCE_*` environment variables. The binary applies its command-line
//! flags on top and validates the result.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::DEFAULT_MAX_ENTRY_SIZE;
use crate::error::ConfigError;
use crate::source::DEFAULT_SECRET_TYPE;

pub const ENV_PREFIX: &str = "YTTSOURCE_";

/// Flux's convention for reaching source-controller from outside the
/// cluster, honoured alongside the prefixed variable.
pub const SOURCE_CONTROLLER_LOCALHOST_ENV: &str = "SOURCE_CONTROLLER_LOCALHOST";

pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 50 * 1024 * 1024;

/// Which engine evaluates the collected template files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngineKind {
    /// The external `ytt` binary.
    #[default]
    Ytt,
    /// Multi-document YAML concatenation, no templating.
    Plain,
}

impl fmt::Display for TemplateEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateEngineKind::Ytt => write!(f, "ytt"),
            TemplateEngineKind::Plain => write!(f, "plain"),
        }
    }
}

impl FromStr for TemplateEngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ytt" => Ok(TemplateEngineKind::Ytt),
            "plain" => Ok(TemplateEngineKind::Plain),
            _ => Err(format!("Unknown template engine: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Maximum number of YttSources reconciled in parallel.
    pub concurrency: u16,
    /// Capacity of the queue carrying backend-triggered reconciles.
    pub queue_capacity: usize,
    /// Requeue interval after a successful reconcile.
    pub sync_period_secs: u64,
    /// Requeue interval while the referenced backend is missing or not ready.
    pub not_ready_requeue_secs: u64,
    /// Requeue interval after a hard reconcile error.
    pub error_requeue_secs: u64,
    /// Upper bound on a single resolve or render call.
    pub operation_timeout_secs: u64,
    /// Maximum size of a downloaded artifact, in bytes.
    pub max_artifact_size: u64,
    /// Maximum size of a single archive entry, in bytes.
    pub max_entry_size: u64,
    /// Secret type accepted for embedded secrets.
    pub secret_type: String,
    pub template_engine: TemplateEngineKind,
    pub ytt_binary: PathBuf,
    /// Replaces the host of artifact URLs, e.g. `localhost:8080`.
    pub source_controller_localhost: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            queue_capacity: 1024,
            sync_period_secs: 600,
            not_ready_requeue_secs: 30,
            error_requeue_secs: 10,
            operation_timeout_secs: 120,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            secret_type: DEFAULT_SECRET_TYPE.to_string(),
            template_engine: TemplateEngineKind::default(),
            ytt_binary: PathBuf::from("ytt"),
            source_controller_localhost: None,
        }
    }
}

impl ControllerConfig {
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn not_ready_requeue(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Applies overrides from the process environment. Variables outside
    /// our namespace are skipped even when they are not valid UTF-8.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let vars = owned_env_vars(std::env::vars_os())?;
        self.apply_overrides(vars)
    }

    /// Applies overrides from `(name, value)` pairs. Unknown names are
    /// ignored; empty values leave the field untouched.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if value.is_empty() {
                continue;
            }
            if name == SOURCE_CONTROLLER_LOCALHOST_ENV {
                self.source_controller_localhost = Some(value);
                continue;
            }
            let Some(field) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "CONCURRENCY" => self.concurrency = parse_env(&name, &value)?,
                "QUEUE_CAPACITY" => self.queue_capacity = parse_env(&name, &value)?,
                "SYNC_PERIOD_SECS" => self.sync_period_secs = parse_env(&name, &value)?,
                "NOT_READY_REQUEUE_SECS" => self.not_ready_requeue_secs = parse_env(&name, &value)?,
                "ERROR_REQUEUE_SECS" => self.error_requeue_secs = parse_env(&name, &value)?,
                "OPERATION_TIMEOUT_SECS" => self.operation_timeout_secs = parse_env(&name, &value)?,
                "MAX_ARTIFACT_SIZE" => self.max_artifact_size = parse_env(&name, &value)?,
                "MAX_ENTRY_SIZE" => self.max_entry_size = parse_env(&name, &value)?,
                "SECRET_TYPE" => self.secret_type = value,
                "TEMPLATE_ENGINE" => self.template_engine = parse_env(&name, &value)?,
                "YTT_BINARY" => self.ytt_binary = PathBuf::from(value),
                "SOURCE_CONTROLLER_LOCALHOST" => self.source_controller_localhost = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("concurrency", u64::from(self.concurrency)),
            ("queue_capacity", self.queue_capacity as u64),
            ("sync_period_secs", self.sync_period_secs),
            ("not_ready_requeue_secs", self.not_ready_requeue_secs),
            ("error_requeue_secs", self.error_requeue_secs),
            ("operation_timeout_secs", self.operation_timeout_secs),
            ("max_artifact_size", self.max_artifact_size),
            ("max_entry_size", self.max_entry_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Validation {
                    message: format!("{} must be greater than zero", field),
                });
            }
        }

        if self.secret_type.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "secret_type must not be empty".to_string(),
            });
        }

        if self.template_engine == TemplateEngineKind::Ytt
            && self.ytt_binary.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation {
                message: "ytt_binary must be set when template_engine is ytt".to_string(),
            });
        }

        if let Some(host) = &self.source_controller_localhost {
            if host.contains('/') || host.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: format!(
                        "source_controller_localhost must be host[:port], got {:?}",
                        host
                    ),
                });
            }
        }

        Ok(())
    }
}

fn is_owned_name(name: &str) -> bool {
    name == SOURCE_CONTROLLER_LOCALHOST_ENV || name.starts_with(ENV_PREFIX)
}

/// Keeps the variables this crate reads, decoded to UTF-8.
fn owned_env_vars<I>(vars: I) -> Result<Vec<(String, String)>, ConfigError>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut owned = Vec::new();
    for (name, value) in vars {
        let Some(name) = name.to_str().filter(|n| is_owned_name(n)) else {
            continue;
        };
        match value.into_string() {
            Ok(value) => owned.push((name.to_string(), value)),
            Err(raw) => {
                return Err(ConfigError::InvalidEnv {
                    name: name.to_string(),
                    value: raw.to_string_lossy().into_owned(),
                    message: "value is not valid UTF-8".to_string(),
                })
            }
        }
    }
    Ok(owned)
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Loads the configuration: defaults, then the file at `path` if given,
/// then environment overrides. The result is validated.
pub fn load_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    let config = load_config_layers(path)?;
    config.validate()?;
    Ok(config)
}

/// Same layering as [`load_config`] without validation, for callers that
/// apply further overrides before validating once.
pub fn load_config_layers(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            parse_config(&content)?
        }
        None => ControllerConfig::default(),
    };

    config.apply_env_overrides()?;
    Ok(config)
}

/// Parses and validates a YAML document without consulting the environment.
pub fn load_config_from_str(content: &str) -> Result<ControllerConfig, ConfigError> {
    let config = parse_config(content)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<ControllerConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(ControllerConfig::default());
    }
    Ok(serde_yaml::from_str(content)?)
}
