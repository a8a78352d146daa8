//! Chat layer configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the layer works with zero
//! configuration in development and tests.

use std::path::PathBuf;
use std::sync::Arc;

use symposium_store::BlobStore;

use crate::error::Result;

/// Tunables for the chat components.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Number of messages the live message feed delivers per snapshot.
    /// Env: `SYMPOSIUM_LIVE_PAGE_SIZE`
    /// Default: `50`
    pub live_page_size: usize,

    /// How many recent messages a mark-read pass scans.
    /// Env: `SYMPOSIUM_READ_SCAN_LIMIT`
    /// Default: `100`
    pub read_scan_limit: usize,

    /// Maximum attachment size in bytes.
    /// Env: `SYMPOSIUM_MAX_ATTACHMENT_SIZE`
    /// Default: 25 MiB
    pub max_attachment_size: usize,

    /// Filesystem path for the attachment blob store.
    /// Env: `SYMPOSIUM_BLOB_PATH`
    /// Default: `./blobs`
    pub blob_path: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            live_page_size: 50,
            read_scan_limit: 100,
            max_attachment_size: 25 * 1024 * 1024,
            blob_path: PathBuf::from("./blobs"),
        }
    }
}

impl ChatConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            live_page_size: env_usize("SYMPOSIUM_LIVE_PAGE_SIZE", defaults.live_page_size),
            read_scan_limit: env_usize("SYMPOSIUM_READ_SCAN_LIMIT", defaults.read_scan_limit),
            max_attachment_size: env_usize(
                "SYMPOSIUM_MAX_ATTACHMENT_SIZE",
                defaults.max_attachment_size,
            ),
            blob_path: std::env::var("SYMPOSIUM_BLOB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.blob_path),
        }
    }

    /// Open the attachment blob store described by this configuration.
    pub async fn open_blob_store(&self) -> Result<Arc<BlobStore>> {
        let store = BlobStore::new(self.blob_path.clone(), self.max_attachment_size).await?;
        Ok(Arc::new(store))
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ChatConfig::default();
        assert_eq!(config.live_page_size, 50);
        assert_eq!(config.read_scan_limit, 100);
    }
}
