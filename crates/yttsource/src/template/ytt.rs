use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use super::{EngineError, TemplateEngine, TemplateFile};
use crate::archive::join_within;

/// Evaluates templates with the external `ytt` binary.
///
/// Inputs are written to a private scratch directory, one subdirectory per
/// synthetic file name prefix, and passed with one `-f` flag each.
#[derive(Debug, Clone)]
pub struct YttEngine {
    binary: PathBuf,
}

impl YttEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl TemplateEngine for YttEngine {
    async fn evaluate(&self, files: Vec<TemplateFile>) -> Result<String, EngineError> {
        let scratch = tempfile::Builder::new()
            .prefix("ytt-input-")
            .tempdir()
            .map_err(|e| EngineError(format!("failed to create scratch directory: {}", e)))?;

        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut roots = Vec::new();
        for file in &files {
            let path = join_within(scratch.path(), Path::new(&file.name))
                .filter(|p| p.as_path() != scratch.path())
                .ok_or_else(|| EngineError(format!("invalid template name {:?}", file.name)))?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError(format!("{}: {}", file.name, e)))?;
            }
            tokio::fs::write(&path, &file.content)
                .await
                .map_err(|e| EngineError(format!("{}: {}", file.name, e)))?;

            let root = input_root(scratch.path(), &file.name);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        for root in &roots {
            cmd.arg("-f").arg(root);
        }

        log::debug!(
            "Running {} with {} inputs",
            self.binary.display(),
            roots.len()
        );

        let output = cmd.output().await.map_err(|e| {
            EngineError(format!("failed to run {}: {}", self.binary.display(), e))
        })?;

        if !output.status.success() {
            return Err(EngineError(format_ytt_error(&output)));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| EngineError(format!("ytt produced invalid UTF-8: {}", e)))
    }
}

/// The top-level scratch entry for a synthetic name, `tpl<i>-<ns>-<name>`.
fn input_root(scratch: &Path, name: &str) -> PathBuf {
    let top = name.split('/').next().unwrap_or(name);
    scratch.join(top)
}

fn format_ytt_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("ytt failed with {}", output.status)
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_root() {
        let scratch = Path::new("/scratch");
        assert_eq!(
            input_root(scratch, "tpl0-apps-render/config/values.yaml"),
            PathBuf::from("/scratch/tpl0-apps-render")
        );
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let engine = YttEngine::new("/nonexistent/ytt-binary");
        let err = engine
            .evaluate(vec![TemplateFile {
                name: "tpl0-a-b/x.yaml".into(),
                content: b"a: 1\n".to_vec(),
            }])
            .await
            .unwrap_err();
        assert!(err.0.starts_with("failed to run /nonexistent/ytt-binary"));
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let engine = YttEngine::new("ytt");
        let err = engine
            .evaluate(vec![TemplateFile {
                name: "../escape.yaml".into(),
                content: Vec::new(),
            }])
            .await
            .unwrap_err();
        assert!(err.0.contains("invalid template name"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        // `false` ignores its arguments and exits 1 with no output.
        let engine = YttEngine::new("false");
        let err = engine.evaluate(Vec::new()).await.unwrap_err();
        assert!(err.0.starts_with("ytt failed with"));
    }

    /// Writes an executable shell script that prints each `-f` flag and the
    /// base name of the path following it, one per line.
    #[cfg(unix)]
    fn argument_echo(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ytt");
        std::fs::write(
            &path,
            "#!/bin/sh\nfor a in \"$@\"; do\n  case \"$a\" in\n    -f) echo \"-f\" ;;\n    *) echo \"${a##*/}\" ;;\n  esac\ndone\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_one_flag_per_input_in_index_order() {
        let bin_dir = tempfile::TempDir::new().unwrap();
        let engine = YttEngine::new(argument_echo(bin_dir.path()));
        let files: Vec<_> = (0..12)
            .map(|i| TemplateFile {
                name: format!("tpl{}-a-b/x.yaml", i),
                content: b"a: 1\n".to_vec(),
            })
            .collect();

        // A freshly written script can briefly report ETXTBSY while another
        // test thread is forking.
        let mut attempts = 0;
        let output = loop {
            attempts += 1;
            match engine.evaluate(files.clone()).await {
                Err(e) if attempts < 5 && e.0.contains("busy") => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                result => break result.unwrap(),
            }
        };

        let expected: Vec<String> = (0..12)
            .flat_map(|i| ["-f".to_string(), format!("tpl{}-a-b", i)])
            .collect();
        assert_eq!(output.lines().collect::<Vec<_>>(), expected);
    }
}
