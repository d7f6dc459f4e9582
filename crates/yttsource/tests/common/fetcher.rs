//! Artifact fetcher serving canned tarballs by URL.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use yttsource::api::Artifact;
use yttsource::archive::Extractor;
use yttsource::source::{ArtifactFetcher, SourceError};

/// Records every fetch and extracts the tarball registered for its URL.
#[derive(Default)]
pub struct RecordingFetcher {
    tarballs: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<(String, PathBuf)>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, tarball: Vec<u8>) {
        self.tarballs.lock().unwrap().insert(url.to_string(), tarball);
    }

    /// Makes every fetch sleep for `delay` first.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for RecordingFetcher {
    async fn fetch(&self, artifact: &Artifact, dest: &Path) -> Result<(), SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((artifact.url.clone(), dest.to_path_buf()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let tarball = self
            .tarballs
            .lock()
            .unwrap()
            .get(&artifact.url)
            .cloned()
            .ok_or_else(|| SourceError::Fetch {
                url: artifact.url.clone(),
                message: "unexpected status 404 Not Found".to_string(),
            })?;

        Extractor::default().extract_reader(tarball.as_slice(), dest)?;
        Ok(())
    }
}
