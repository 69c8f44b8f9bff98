//! Filesystem-backed content store for profile pictures.
//!
//! Files are addressed by forward-slash relative paths under a media root.
//! Writes go to a temporary file in the target directory and are renamed
//! into place, so a reader never observes a half-written picture.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::errors::ContentError;
use crate::store::{ByteStream, ContentStore};

/// Content store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileSystemContentStore {
    root: PathBuf,
}

impl FileSystemContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!(root = %root.display(), "using filesystem content store");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative content path to a file under the root.
    ///
    /// Rejects empty, absolute and parent-escaping paths.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ContentError> {
        let relative = Path::new(path);
        if path.is_empty() {
            return Err(ContentError::InvalidPath(path.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(ContentError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for FileSystemContentStore {
    async fn write_file(
        &self,
        path: &str,
        mut body: ByteStream,
        overwrite: bool,
    ) -> Result<u64, ContentError> {
        let target = self.resolve(path)?;

        if !overwrite && tokio::fs::try_exists(&target).await? {
            return Err(ContentError::AlreadyExists(path.to_string()));
        }

        let dir = target
            .parent()
            .ok_or_else(|| ContentError::InvalidPath(path.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let tmp = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&dir)?;
        let (std_file, tmp_path) = tmp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ContentError::StreamError(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tmp_path
            .persist(&target)
            .map_err(|e| ContentError::IoError(e.error))?;

        debug!(path, bytes = written, "content file written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn body(parts: &[&'static [u8]]) -> ByteStream {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Box::pin(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_write_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemContentStore::new(dir.path());

        let n = store
            .write_file("UserAvatars/a.jpg", body(&[b"abc", b"def"]), true)
            .await
            .unwrap();
        assert_eq!(n, 6);
        let path = dir.path().join("UserAvatars").join("a.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");

        store
            .write_file("UserAvatars/a.jpg", body(&[b"xyz"]), true)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn test_no_overwrite_rejects_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemContentStore::new(dir.path());
        store.write_file("a.jpg", body(&[b"1"]), false).await.unwrap();

        let result = store.write_file("a.jpg", body(&[b"2"]), false).await;
        assert!(matches!(result, Err(ContentError::AlreadyExists(_))));
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_stream_error_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemContentStore::new(dir.path());
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let result = store
            .write_file("UserAvatars/b.jpg", Box::pin(futures::stream::iter(chunks)), true)
            .await;
        assert!(matches!(result, Err(ContentError::StreamError(_))));
        assert!(!dir.path().join("UserAvatars").join("b.jpg").exists());
    }

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let store = FileSystemContentStore::new("/srv/media");
        assert!(store.resolve("UserAvatars/x.jpg").is_ok());
        assert!(matches!(store.resolve(""), Err(ContentError::InvalidPath(_))));
        assert!(matches!(store.resolve("/etc/passwd"), Err(ContentError::InvalidPath(_))));
        assert!(matches!(store.resolve("../x.jpg"), Err(ContentError::InvalidPath(_))));
    }
}
