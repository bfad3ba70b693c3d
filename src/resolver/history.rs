//! Client for the public release history service
//!
//! `GET <history_url>/<appId>` answers with
//! `{"data": [{"external_identifier": ..., "bundle_version": ...}, ...]}`.

use crate::config::Config;
use crate::di::HistoryProvider;
use crate::store::types::string_or_number;
use crate::store::AppId;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rewind_core::{ResolutionError, RewindError, RewindResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One release as recorded by the history service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub external_identifier: String,
    #[serde(deserialize_with = "string_or_number")]
    pub bundle_version: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    data: Vec<HistoryEntry>,
}

/// HTTP client for the history service
pub struct HistoryClient {
    client: Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(config: &Config) -> RewindResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RewindError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.history_url.trim_end_matches('/').to_string(),
        })
    }

    fn history_url(&self, app_id: &AppId) -> String {
        format!("{}/{}", self.base_url, app_id)
    }
}

#[async_trait]
impl HistoryProvider for HistoryClient {
    async fn fetch_history(&self, app_id: &AppId) -> Result<Vec<HistoryEntry>, ResolutionError> {
        let url = self.history_url(app_id);
        debug!(%url, "fetching release history");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolutionError::NetworkUnavailable(e.to_string()))?;

        // The service answers 404 for apps it has never seen
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ResolutionError::Rejected(format!(
                "history service returned HTTP {}",
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| ResolutionError::NetworkUnavailable(e.to_string()))?;
        let parsed: HistoryResponse = serde_json::from_str(&content)
            .map_err(|e| ResolutionError::MalformedResponse(e.to_string()))?;
        Ok(parsed.data)
    }
}
