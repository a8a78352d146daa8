//! Filesystem-backed attachment storage.
//!
//! Blobs are stored under caller-qualified keys such as
//! `chats/<chat-id>/<millis>_<file-name>` and retrieved through a durable
//! `blob:/<key>` URL.  Keys are validated against path traversal before
//! they ever touch the filesystem.

use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

const URL_SCHEME: &str = "blob:/";

/// Object storage for file attachments.
pub struct BlobStore {
    base_path: PathBuf,
    max_size: usize,
    /// Key -> stored size, for cheap existence checks without hitting disk.
    index: DashMap<String, usize>,
}

impl BlobStore {
    /// Open (or create) a blob store rooted at `base_path`.
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), max_size, "Blob store initialized");
        Ok(Self {
            base_path,
            max_size,
            index: DashMap::new(),
        })
    }

    /// Upload a blob under `key` and return its retrieval URL.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(StoreError::Internal("empty blob".to_string()));
        }
        if data.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let path = self.safe_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        self.index.insert(key.to_string(), data.len());

        debug!(key, size = data.len(), "Stored blob");
        Ok(self.url_for(key))
    }

    /// The durable retrieval URL for a key.
    pub fn url_for(&self, key: &str) -> String {
        format!("{URL_SCHEME}{key}")
    }

    /// Fetch a blob by key.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.safe_path(key)?;
        if !path.exists() {
            return Err(StoreError::NotFound);
        }
        let data = fs::read(&path).await?;
        debug!(key, size = data.len(), "Retrieved blob");
        Ok(data)
    }

    /// Fetch a blob by its retrieval URL.
    pub async fn get_url(&self, url: &str) -> Result<Vec<u8>> {
        let key = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| StoreError::InvalidKey(url.to_string()))?;
        self.get(key).await
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Resolve a key to a path inside the base directory.  Only plain path
    /// components are allowed; `..`, roots, and prefixes are rejected.
    fn safe_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('\\') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let mut resolved = self.base_path.clone();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                _ => return Err(StoreError::InvalidKey(key.to_string())),
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (BlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let (store, _dir) = test_store().await;
        let url = store.put("chats/c1/17_report.pdf", b"pdf-bytes").await.unwrap();
        assert_eq!(url, "blob:/chats/c1/17_report.pdf");

        assert_eq!(store.get("chats/c1/17_report.pdf").await.unwrap(), b"pdf-bytes");
        assert_eq!(store.get_url(&url).await.unwrap(), b"pdf-bytes");
        assert!(store.contains("chats/c1/17_report.pdf"));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.put("../escape", b"x").await.is_err());
        assert!(store.put("/absolute", b"x").await.is_err());
        assert!(store.put("a/../../b", b"x").await.is_err());
    }

    #[tokio::test]
    async fn size_cap_is_enforced() {
        let (store, _dir) = test_store().await;
        let big = vec![0u8; 2048];
        let err = store.put("chats/c1/big", &big).await.unwrap_err();
        assert!(matches!(err, StoreError::BlobTooLarge { .. }));
    }

    #[tokio::test]
    async fn empty_blob_is_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.put("chats/c1/empty", b"").await.is_err());
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let (store, _dir) = test_store().await;
        assert!(matches!(
            store.get("chats/c1/none").await.unwrap_err(),
            StoreError::NotFound
        ));
    }
}
