use std::path::PathBuf;

use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Errors surfaced by a `BlobStore` implementation.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob {0} not found")]
    NotFound(String),
    #[error("blob store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stand-in for the real object store named as out of scope in §1 ("Object
/// storage ... treated as a blob store with get/put/presigned-URL
/// operations"). Keys are opaque strings; callers never construct their own.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, BlobStoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
    /// A presigned-style URL for `key`, if this implementation can issue
    /// one. `None` means the caller should fetch bytes via `get` instead
    /// (the API layer proxies them rather than redirecting).
    async fn presigned_url(&self, key: &str) -> Result<Option<String>, BlobStoreError>;
}

/// Local-filesystem `BlobStore`. Keys are content-addressed only in the
/// sense that they are random — this stands in for a real object store in
/// single-process deployments and never issues presigned URLs.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub async fn ensure_root(&self) -> Result<(), BlobStoreError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, BlobStoreError> {
        self.ensure_root().await?;
        let key = Uuid::new_v4().to_string();
        fs::write(self.path_for(&key), bytes).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobStoreError::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobStoreError::Io(e)),
        }
    }

    async fn presigned_url(&self, _key: &str) -> Result<Option<String>, BlobStoreError> {
        Ok(None)
    }
}
