//! Snapshot sources: the member-tracking endpoint over HTTP, or a local file
//! in the same format.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Snapshot, SnapshotError};
use crate::ports::SnapshotSource;

/// Credentials and location of the member-tracking endpoint.
#[derive(Debug, Clone)]
pub struct FeedEndpoint {
    pub base_url: String,
    pub path: String,
    pub key_id: i64,
    pub verification_code: String,
}

impl FeedEndpoint {
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

pub struct HttpSnapshotSource {
    client: reqwest::Client,
    endpoint: FeedEndpoint,
}

impl HttpSnapshotSource {
    pub fn new(endpoint: FeedEndpoint) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError> {
        let url = self.endpoint.url();
        debug!(url = %url, "pulling member snapshot");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("keyid", self.endpoint.key_id.to_string()),
                ("vcode", self.endpoint.verification_code.clone()),
                ("extended", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SnapshotError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SnapshotError::Request(e.to_string()))?;
        decode(&body)
    }
}

/// Reads the feed document from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError> {
        let path = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(path))
            .await
            .map_err(|e| SnapshotError::Request(format!("read task failed: {e}")))??;
        decode(&bytes)
    }
}

fn decode(body: &[u8]) -> Result<Snapshot, SnapshotError> {
    serde_json::from_slice(body).map_err(|e| SnapshotError::Decode(e.to_string()))
}
