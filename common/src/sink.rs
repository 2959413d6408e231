//! # Result Delivery
//!
//! Where finished (and in-progress) discovery jobs report to, plus the request
//! model that identifies a job.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{InvalidAssetIdError, SinkError};
use crate::network::host::DiscoveryItem;

pub const MAX_ASSET_ID_LEN: usize = 128;

/// Identifier of the asset a discovery job belongs to.
///
/// Collectors send it either as a JSON string or a number. It becomes one path
/// segment of every collector URL, so only `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAssetId", into = "String")]
pub struct AssetId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAssetId {
    Text(String),
    Number(i64),
}

impl TryFrom<RawAssetId> for AssetId {
    type Error = InvalidAssetIdError;

    fn try_from(raw: RawAssetId) -> Result<Self, Self::Error> {
        match raw {
            RawAssetId::Text(text) => AssetId::parse(text),
            RawAssetId::Number(number) => AssetId::parse(number.to_string()),
        }
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

impl AssetId {
    /// Wraps `id` without validation. Inbound ids go through [`AssetId::parse`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn parse(id: impl Into<String>) -> Result<Self, InvalidAssetIdError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_ASSET_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(InvalidAssetIdError(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound request to start a discovery job.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRequest {
    pub asset_id: AssetId,
    pub targets: Vec<String>,
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Signals that the job for `asset_id` is still running.
    async fn keep_alive(&self, asset_id: &AssetId) -> Result<(), SinkError>;

    /// Delivers the final results of the job for `asset_id`.
    async fn push_results(
        &self,
        asset_id: &AssetId,
        items: &[DiscoveryItem],
    ) -> Result<(), SinkError>;
}
