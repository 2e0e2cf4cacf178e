//! Blob storage contract and the filesystem implementation used by the service.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value storage for document content
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, returning the key written
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Read a blob, failing with [`StorageError::NotFound`] when absent
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Blobs stored as files below a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a key to a path, refusing keys that could escape the root
    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Write to a sibling temp file first so readers never see a partial blob
        let tmp_path = path.with_extension("partial");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(io_err)?;

        debug!(key = %key, bytes = bytes.len(), content_type = %content_type, "Stored blob");
        Ok(key.to_string())
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let key = store
            .upload("documents/doc-1/content.txt", b"hello".to_vec(), "text/plain")
            .await
            .unwrap();
        assert_eq!(key, "documents/doc-1/content.txt");
        assert!(dir.path().join("documents/doc-1/content.txt").exists());

        let bytes = store.download(&key).await.unwrap();
        assert_eq!(bytes, b"hello");

        store.delete(&key).await.unwrap();
        assert!(matches!(
            store.download(&key).await,
            Err(StorageError::NotFound { .. })
        ));
        // Deleting again is not an error
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .upload("documents/d/content.txt", b"first".to_vec(), "text/plain")
            .await
            .unwrap();
        store
            .upload("documents/d/content.txt", b"second".to_vec(), "text/plain")
            .await
            .unwrap();

        let bytes = store.download("documents/d/content.txt").await.unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        for key in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            assert!(matches!(
                store.upload(key, Vec::new(), "text/plain").await,
                Err(StorageError::InvalidKey { .. })
            ));
        }
    }
}
