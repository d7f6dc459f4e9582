use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256, Sha384, Sha512};
use url::Url;

use super::{lookup_failed, not_found, SourceError, SourceResolver, StagingDir};
use crate::api::Artifact;
use crate::archive::Extractor;
use crate::config::ControllerConfig;
use crate::reference::{ExternalReference, ReferenceKind};
use crate::sanitize::redact_url;

/// Downloads a Flux artifact and unpacks it into a directory.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetches `artifact` into `dest`, which already exists and is empty.
    async fn fetch(&self, artifact: &Artifact, dest: &Path) -> Result<(), SourceError>;
}

/// Fetches artifacts over HTTP from source-controller.
///
/// Each call makes a single attempt; retries come from requeueing the
/// YttSource.
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
    max_size: u64,
    extractor: Extractor,
    host_override: Option<String>,
}

impl HttpArtifactFetcher {
    pub fn new(config: &ControllerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.operation_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            max_size: config.max_artifact_size,
            extractor: Extractor::new(config.max_entry_size),
            host_override: config.source_controller_localhost.clone(),
        })
    }

    fn artifact_url(&self, raw: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(raw).map_err(|e| SourceError::Fetch {
            url: redact_url(raw),
            message: format!("invalid URL: {}", e),
        })?;
        if let Some(host) = &self.host_override {
            override_host(&mut url, host).map_err(|message| SourceError::Fetch {
                url: redact_url(raw),
                message,
            })?;
        }
        Ok(url)
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
        let fetch_err = |message: String| SourceError::Fetch {
            url: redact_url(url.as_str()),
            message,
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_err(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("unexpected status {}", status)));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_size {
                return Err(fetch_err(format!(
                    "artifact size {} exceeds the {} byte limit",
                    length, self.max_size
                )));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_err(e.without_url().to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_size {
                return Err(fetch_err(format!(
                    "artifact exceeds the {} byte limit",
                    self.max_size
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, artifact: &Artifact, dest: &Path) -> Result<(), SourceError> {
        let url = self.artifact_url(&artifact.url)?;
        let body = self.download(&url).await?;
        verify_digest(&artifact.digest, &body)?;

        let extractor = self.extractor;
        let dest = dest.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            extractor.extract_reader(Cursor::new(body), &dest)
        })
        .await
        .map_err(|e| SourceError::Io(std::io::Error::other(e)))??;

        tracing::debug!(url = %redact_url(url.as_str()), files, "Artifact extracted");
        Ok(())
    }
}

/// Replaces the host (and port, when given) of `url` with `host`.
fn override_host(url: &mut Url, host: &str) -> Result<(), String> {
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in host override {:?}", host))?;
            (name, Some(port))
        }
        _ => (host, None),
    };
    url.set_host(Some(name))
        .map_err(|e| format!("invalid host override {:?}: {}", host, e))?;
    url.set_port(port)
        .map_err(|_| format!("cannot set port on {}", redact_url(url.as_str())))?;
    Ok(())
}

/// Checks `data` against a digest in `<algorithm>:<hex>` form.
pub fn verify_digest(expected: &str, data: &[u8]) -> Result<(), SourceError> {
    let (algorithm, hex) = expected
        .split_once(':')
        .ok_or_else(|| SourceError::UnsupportedDigest(expected.to_string()))?;

    let actual = match algorithm {
        "sha256" => format!("{:x}", Sha256::digest(data)),
        "sha384" => format!("{:x}", Sha384::digest(data)),
        "sha512" => format!("{:x}", Sha512::digest(data)),
        _ => return Err(SourceError::UnsupportedDigest(expected.to_string())),
    };

    if !actual.eq_ignore_ascii_case(hex) {
        return Err(SourceError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("{}:{}", algorithm, actual),
        });
    }
    Ok(())
}

impl SourceResolver {
    pub(super) async fn resolve_artifact(
        &self,
        kind: ReferenceKind,
        reference: &ExternalReference,
    ) -> Result<StagingDir, SourceError> {
        let status = self
            .cluster
            .get_artifact_source(kind, &reference.namespace, &reference.name)
            .await
            .map_err(|e| lookup_failed(reference, e))?
            .ok_or_else(|| not_found(reference))?;

        let artifact = status.artifact.ok_or_else(|| SourceError::SourceNotReady {
            kind: reference.kind.clone(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        })?;

        tracing::info!(
            source = %reference,
            revision = artifact.revision.as_deref().unwrap_or(""),
            "Fetching artifact"
        );

        let staging = StagingDir::new(reference)?;
        self.fetcher.fetch(&artifact, staging.path()).await?;
        Ok(staging)
    }
}
