use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempDir;
use uuid::Uuid;

/// Hands out one fresh directory per judging call under a shared root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn acquire(&self, judge_id: Uuid) -> anyhow::Result<Workspace> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create workspace root {}", self.root.display()))?;

        let root = self.root.clone();
        let prefix = format!("judge-{}-", judge_id.as_simple());
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(root)
        })
        .await
        .context("workspace creation task failed")?
        .context("failed to create workspace directory")?;

        tracing::debug!(workspace = %dir.path().display(), "workspace acquired");
        Ok(Workspace { dir: Some(dir) })
    }
}

/// Exclusively owned working directory for one judging call.
///
/// Dropping the handle removes the directory as well, so a panicking call
/// still cleans up; `release` is the awaited path used on normal exits.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    pub async fn write_file(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.file(name);
        tokio::fs::write(&path, contents.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Best effort: missing files and removal errors are logged, never returned.
    pub async fn release(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => tracing::debug!(workspace = %path.display(), "workspace released"),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
            Ok(Err(err)) => {
                tracing::warn!(workspace = %path.display(), error = %err, "workspace cleanup failed");
            }
            Err(err) => {
                tracing::warn!(workspace = %path.display(), error = %err, "workspace cleanup task failed");
            }
        }
    }
}
