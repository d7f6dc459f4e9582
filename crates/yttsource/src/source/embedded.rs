use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;

use k8s_openapi::ByteString;

use super::{lookup_failed, not_found, SourceError, SourceResolver, StagingDir, EXTRACTED_DIR, PAYLOAD_KEY};
use crate::archive::Extractor;
use crate::reference::ExternalReference;
use crate::sanitize::redact_path;

impl SourceResolver {
    pub(super) async fn resolve_config_map(
        &self,
        reference: &ExternalReference,
    ) -> Result<StagingDir, SourceError> {
        let config_map = self
            .cluster
            .get_config_map(&reference.namespace, &reference.name)
            .await
            .map_err(|e| lookup_failed(reference, e))?
            .ok_or_else(|| not_found(reference))?;

        let payload = take_payload(config_map.binary_data)?;
        self.stage(reference, payload).await
    }

    pub(super) async fn resolve_secret(
        &self,
        reference: &ExternalReference,
    ) -> Result<StagingDir, SourceError> {
        let secret = self
            .cluster
            .get_secret(&reference.namespace, &reference.name)
            .await
            .map_err(|e| lookup_failed(reference, e))?
            .ok_or_else(|| not_found(reference))?;

        let found = secret.type_.unwrap_or_default();
        if found != self.secret_type {
            return Err(SourceError::UnsupportedSecretType {
                found,
                expected: self.secret_type.clone(),
            });
        }

        let payload = take_payload(secret.data)?;
        self.stage(reference, payload).await
    }

    async fn stage(
        &self,
        reference: &ExternalReference,
        payload: Vec<u8>,
    ) -> Result<StagingDir, SourceError> {
        let reference = reference.clone();
        let extractor = self.extractor;
        tokio::task::spawn_blocking(move || stage_payload(&reference, &payload, extractor))
            .await
            .map_err(|e| SourceError::Io(std::io::Error::other(e)))?
    }
}

fn take_payload(data: Option<BTreeMap<String, ByteString>>) -> Result<Vec<u8>, SourceError> {
    data.and_then(|mut entries| entries.remove(PAYLOAD_KEY))
        .map(|bytes| bytes.0)
        .ok_or_else(|| SourceError::MissingPayload {
            key: PAYLOAD_KEY.to_string(),
        })
}

/// Writes the tarball into a fresh staging directory and unpacks it into
/// its `extracted` subdirectory.
fn stage_payload(
    reference: &ExternalReference,
    payload: &[u8],
    extractor: Extractor,
) -> Result<StagingDir, SourceError> {
    let mut staging = StagingDir::new(reference)?;

    let archive = staging.root().join(PAYLOAD_KEY);
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(&archive)?.write_all(payload)?;

    let extracted = staging.root().join(EXTRACTED_DIR);
    let files = extractor.extract_file(&archive, &extracted)?;
    log::debug!(
        "Extracted {} files from {} into {}",
        files,
        reference,
        redact_path(&extracted)
    );

    staging.set_content_dir(extracted);
    Ok(staging)
}
