//! Blob storage abstraction over the `object_store` crate
//!
//! Uploaded log files live in external blob storage; the engine only ever
//! reads them. [`BlobSource`] is the seam the retriever depends on, so tests
//! can substitute failing or hanging sources.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{path::Path as StoragePath, ObjectStore};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;

/// Read-side interface to blob storage.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Fetch the full contents behind `locator`.
    async fn fetch(&self, locator: &str) -> Result<Bytes>;
}

/// Blob client wrapping any `object_store` backend.
#[derive(Clone)]
pub struct BlobClient {
    store: Arc<dyn ObjectStore>,
}

impl BlobClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Local filesystem backend rooted at `/`; locators are absolute paths
    /// converted via [`StoragePath::from_filesystem_path`].
    pub fn local() -> Result<Self> {
        Ok(Self {
            store: Arc::new(object_store::local::LocalFileSystem::new()),
        })
    }

    /// In-memory backend for tests and development.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
        }
    }

    /// Store bytes under `locator` (test seeding and local ingest).
    pub async fn put(&self, locator: &str, data: Bytes) -> Result<()> {
        let path = StoragePath::from(locator);
        self.store.put(&path, data.into()).await?;
        Ok(())
    }

    /// Check whether `locator` exists.
    pub async fn exists(&self, locator: &str) -> Result<bool> {
        let path = StoragePath::from(locator);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobSource for BlobClient {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        let path = StoragePath::from(locator);

        let result = match self.store.get(&path).await {
            Ok(r) => r,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(BlobError::NotFound(locator.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| BlobError::FetchFailed(e.to_string()))?;

        tracing::debug!(locator, size = bytes.len(), "fetched blob");
        Ok(bytes)
    }
}
