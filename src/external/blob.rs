//! Blob storage for request videos, proof media and ID documents.
//!
//! The engine hands file bytes to a [`BlobStore`] and keeps only the returned
//! reference.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::request::MediaRef;
use crate::error::{LifelineError, Result};

/// A file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Reference returned by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub url: String,
    pub public_id: String,
}

impl StoredBlob {
    pub fn into_media(self, mime_type: Option<String>) -> MediaRef {
        MediaRef {
            url: self.url,
            public_id: Some(self.public_id),
            mime_type,
            thumbnail: None,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `upload` under `folder`.
    async fn upload(&self, upload: Upload, folder: &str) -> Result<StoredBlob>;
}

/// Configuration for [`HttpBlobStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    /// Upload endpoint. Receives the raw bytes, answers `{"url", "public_id"}`.
    pub endpoint: String,
    /// Sent as a bearer token when non-empty
    pub api_key: String,
    pub timeout_ms: u64,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000/upload".to_string(),
            api_key: String::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Blob store reached over HTTP.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    config: BlobStoreConfig,
}

impl HttpBlobStore {
    pub fn new(config: BlobStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    #[tracing::instrument(skip(self, upload), fields(file_name = %upload.file_name, size = upload.bytes.len()))]
    async fn upload(&self, upload: Upload, folder: &str) -> Result<StoredBlob> {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .query(&[("folder", folder), ("file_name", upload.file_name.as_str())])
            .header("Content-Type", upload.mime_type.as_str())
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .body(upload.bytes);
        if !self.config.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "Blob upload failed");
            LifelineError::Other(anyhow::anyhow!("Blob upload failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LifelineError::Other(anyhow::anyhow!(
                "Blob store returned {}: {}",
                status,
                body
            )));
        }

        let stored: StoredBlob = response.json().await.map_err(|e| {
            LifelineError::Other(anyhow::anyhow!("Invalid blob store response: {}", e))
        })?;
        tracing::debug!(public_id = %stored.public_id, "Blob uploaded");
        Ok(stored)
    }
}

/// Mock blob store for testing.
///
/// Returns `mock://<folder>/<n>/<file_name>` URLs and records every upload.
#[derive(Clone, Default)]
pub struct MockBlobStore {
    uploads: Arc<Mutex<Vec<(String, Upload)>>>,
    counter: Arc<AtomicUsize>,
    failing: Arc<Mutex<bool>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent uploads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// `(folder, upload)` for every successful upload.
    pub fn uploads(&self) -> Vec<(String, Upload)> {
        self.uploads.lock().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn upload(&self, upload: Upload, folder: &str) -> Result<StoredBlob> {
        if *self.failing.lock() {
            return Err(LifelineError::Other(anyhow::anyhow!(
                "mock blob store unavailable"
            )));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let public_id = format!("{folder}/{n}");
        let stored = StoredBlob {
            url: format!("mock://{public_id}/{}", upload.file_name),
            public_id,
        };
        self.uploads.lock().push((folder.to_string(), upload));
        Ok(stored)
    }
}
