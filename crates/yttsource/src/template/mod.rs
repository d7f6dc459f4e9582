//! Turns a staged source tree into rendered YAML.
//!
//! [`TemplateRenderer`] picks the directory to render, collects its files in
//! a deterministic order and hands them to a [`TemplateEngine`].

mod plain;
mod ytt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use walkdir::WalkDir;

pub use plain::PlainYamlEngine;
pub use ytt::YttEngine;

use crate::archive::join_within;
use crate::reference::ObjectKey;
use crate::source::SourceError;

pub const DOCUMENT_SEPARATOR: &str = "---\n";

/// One input file handed to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Synthetic identifier: `tpl<index>-<namespace>-<name>/<relative path>`.
    pub name: String,
    pub content: Vec<u8>,
}

/// Engine failure. The message is reported verbatim as the failure reason.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

/// Evaluates a set of template files into a single multi-document YAML
/// string.
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn evaluate(&self, files: Vec<TemplateFile>) -> Result<String, EngineError>;
}

/// Joins YAML documents with `---` separators.
pub fn join_documents<I, S>(documents: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, doc) in documents.into_iter().enumerate() {
        let doc = doc.as_ref();
        if i > 0 {
            out.push_str(DOCUMENT_SEPARATOR);
        }
        out.push_str(doc);
        if !doc.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

pub struct TemplateRenderer {
    engine: Arc<dyn TemplateEngine>,
}

impl TemplateRenderer {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self { engine }
    }

    /// Renders the files under `sub_path` of `staging` on behalf of `owner`.
    pub async fn render(
        &self,
        staging: &Path,
        sub_path: &str,
        owner: &ObjectKey,
    ) -> Result<String, SourceError> {
        let dir = resolve_sub_path(staging, sub_path)?;
        let owner = owner.clone();
        let files = tokio::task::spawn_blocking(move || collect_inputs(&dir, &owner))
            .await
            .map_err(|e| SourceError::Io(std::io::Error::other(e)))??;

        tracing::debug!(files = files.len(), "Evaluating templates");

        self.engine
            .evaluate(files)
            .await
            .map_err(|e| SourceError::Template(e.0))
    }
}

/// Resolves the directory to render inside `root`.
///
/// The path is cleaned lexically; a path climbing out of `root` is rejected
/// and a path that does not exist is reported as such.
pub fn resolve_sub_path(root: &Path, sub_path: &str) -> Result<PathBuf, SourceError> {
    let dir = join_within(root, Path::new(sub_path))
        .ok_or_else(|| SourceError::PathEscape(sub_path.to_string()))?;
    if !dir.exists() {
        let shown = dir.strip_prefix(root).unwrap_or(&dir).to_path_buf();
        return Err(SourceError::PathNotFound(shown));
    }
    Ok(dir)
}

/// Collects every regular file under `dir`, ordered by path.
///
/// Symbolic links are not followed.
pub fn collect_inputs(dir: &Path, owner: &ObjectKey) -> Result<Vec<TemplateFile>, SourceError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => PathBuf::from(entry.file_name()),
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let content = std::fs::read(entry.path())?;
        files.push(TemplateFile {
            name: format!(
                "tpl{}-{}-{}/{}",
                files.len(),
                owner.namespace,
                owner.name,
                relative
            ),
            content,
        });
    }

    Ok(files)
}
