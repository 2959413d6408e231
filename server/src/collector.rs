//! HTTP client for the remote collector that receives discovery results.

use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use scanbox_common::config::CollectorConfig;
use scanbox_common::error::SinkError;
use scanbox_common::network::host::DiscoveryItem;
use scanbox_common::sink::{AssetId, ResultSink};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpCollector {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpCollector {
    pub fn new(cfg: &CollectorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build collector HTTP client")?;

        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("Invalid collector URL '{}'", cfg.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Collector URL '{}' cannot carry a path", cfg.base_url);
        }

        Ok(Self {
            client,
            base_url,
            token: cfg.token.clone(),
        })
    }

    fn results_url(&self, asset_id: &AssetId) -> Result<Url, SinkError> {
        self.asset_url(asset_id, &["host-scans", ""])
    }

    fn keep_alive_url(&self, asset_id: &AssetId) -> Result<Url, SinkError> {
        self.asset_url(asset_id, &["host-scans", "keep-alive", ""])
    }

    /// `{base}/api/assets/{asset_id}/{tail..}`, with the id percent-encoded
    /// into exactly one path segment.
    fn asset_url(&self, asset_id: &AssetId, tail: &[&str]) -> Result<Url, SinkError> {
        if matches!(asset_id.as_str(), "" | "." | "..") {
            return Err(SinkError::Encode(format!("unusable asset id '{asset_id}'")));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SinkError::Encode("collector URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "assets", asset_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn post(&self, url: Url, json: Option<Vec<u8>>) -> Result<(), SinkError> {
        let mut request = self.client.post(url.clone()).bearer_auth(&self.token);
        if let Some(body) = json {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("POST {url} -> {status}");
        Ok(())
    }
}

#[async_trait]
impl ResultSink for HttpCollector {
    async fn keep_alive(&self, asset_id: &AssetId) -> Result<(), SinkError> {
        self.post(self.keep_alive_url(asset_id)?, None).await
    }

    async fn push_results(
        &self,
        asset_id: &AssetId,
        items: &[DiscoveryItem],
    ) -> Result<(), SinkError> {
        let body = serde_json::to_vec(items).map_err(|e| SinkError::Encode(e.to_string()))?;
        self.post(self.results_url(asset_id)?, Some(body)).await
    }
}
