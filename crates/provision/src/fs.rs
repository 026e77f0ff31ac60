//! File system utils.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;

pub struct FsHandler;

impl FsHandler {
    /// Create the parent directory of `path` if it doesn't exist.
    pub async fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };

        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        tracing::debug!(path = %parent.display(), "Ensured parent directory exists");

        Ok(())
    }

    pub async fn read_to_string(path: &Path) -> anyhow::Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Write `contents` to `path`, replacing any previous file.
    ///
    /// The data goes to a sibling temporary file first and is renamed into
    /// place, so `path` never holds a partially written document.
    pub async fn write_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        Self::write_atomic(path, contents, None).await
    }

    /// Like [`FsHandler::write_file`], readable by the owner only.
    ///
    /// The temporary file is created with mode `0o600`, so the contents are
    /// never visible to other users.
    pub async fn write_private_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        Self::write_atomic(path, contents, Some(0o600)).await
    }

    async fn write_atomic(path: &Path, contents: &[u8], mode: Option<u32>) -> anyhow::Result<()> {
        Self::create_parent_dir(path).await?;

        let tmp_path = Self::tmp_path(path)?;
        // A leftover from an interrupted run would keep its old mode.
        let _ = tokio::fs::remove_file(&tmp_path).await;

        if let Err(e) = Self::write_new(&tmp_path, contents, mode).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to move file into {}", path.display()));
        }

        Ok(())
    }

    async fn write_new(path: &Path, contents: &[u8], mode: Option<u32>) -> anyhow::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);

        #[cfg(unix)]
        if let Some(mode) = mode {
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options
            .open(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        file.write_all(contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to flush {}", path.display()))?;

        Ok(())
    }

    fn tmp_path(path: &Path) -> anyhow::Result<PathBuf> {
        let file_name = path
            .file_name()
            .with_context(|| format!("{} is not a file path", path.display()))?;

        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        Ok(path.with_file_name(tmp_name))
    }
}
