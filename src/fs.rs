//! Filesystem capability used for every local write
//!
//! The pipeline never touches `tokio::fs` directly; it goes through
//! [`FileSystem`] so tests can observe or fail writes.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncWrite;

/// Writable handle returned by [`FileSystem::create`]
pub type FileWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Create directories and truncate files
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create `path` and all missing parents (mode 0755 on unix)
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Create or truncate the file at `path` (mode 0644 on unix)
    async fn create(&self, path: &Path) -> Result<FileWriter>;
}

/// [`FileSystem`] backed by the local disk
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(path).await?;
        Ok(())
    }

    async fn create(&self, path: &Path) -> Result<FileWriter> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o644);
        let file = options.open(path).await?;
        Ok(Box::pin(file))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn creates_nested_dirs_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem;
        let nested = dir.path().join("a/b/c");
        fs.create_dir_all(&nested).await.unwrap();
        assert!(nested.is_dir());

        let file = nested.join("x.txt");
        let mut w = fs.create(&file).await.unwrap();
        w.write_all(b"first version").await.unwrap();
        w.shutdown().await.unwrap();

        let mut w = fs.create(&file).await.unwrap();
        w.write_all(b"second").await.unwrap();
        w.shutdown().await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "second");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_mode_is_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.bin");
        let mut w = TokioFileSystem.create(&file).await.unwrap();
        w.shutdown().await.unwrap();
        let mode = std::fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        // umask can only clear bits
        assert_eq!(mode & !0o644, 0);
    }
}
