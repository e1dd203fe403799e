//! Content-addressed document store (IPFS HTTP API + gateway).
//!
//! No caching and no retries: a failed upload leaves nothing behind and the
//! caller resubmits the whole document.

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{CertifierError, Result};

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Upload a blob, returning its content identifier.
    async fn store(&self, bytes: Vec<u8>, filename: &str) -> Result<String>;

    /// Gateway URL for a content id; `None` for an empty id. Pure.
    fn resolve_url(&self, content_id: &str) -> Option<String>;

    /// Whether the gateway serves the content yet. Informational only.
    async fn probe(&self, content_id: &str) -> bool;
}

/// `<gateway-base>/ipfs/<id>`, or `None` for a blank id.
pub fn gateway_url(gateway_base: &str, content_id: &str) -> Option<String> {
    let id = content_id.trim();
    if id.is_empty() {
        return None;
    }
    Some(format!("{}/ipfs/{id}", gateway_base.trim_end_matches('/')))
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Name")]
    name: Option<String>,
}

pub struct IpfsStore {
    client: Client,
    api_url: String,
    gateway_url: String,
}

impl IpfsStore {
    pub fn new(client: Client, api_url: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into(),
        }
    }
}

#[async_trait]
impl ContentStore for IpfsStore {
    async fn store(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        let size = bytes.len();
        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/v0/add?pin=true", self.api_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    CertifierError::StoreUnavailable(e.to_string())
                } else {
                    CertifierError::Upload(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CertifierError::Upload(e.to_string()))?;

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(CertifierError::StoreUnavailable(format!(
                "IPFS add returned {status}"
            )));
        }
        if !status.is_success() {
            warn!("IPFS add of {filename} ({size} bytes) rejected: {status}");
            return Err(CertifierError::Upload(format!(
                "IPFS add returned {status}: {}",
                body.trim()
            )));
        }

        // The add endpoint streams one JSON object per line; the last one
        // describes the root of what was added.
        let last = body
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| CertifierError::Upload("empty IPFS add response".to_string()))?;
        let added: AddResponse = serde_json::from_str(last)
            .map_err(|e| CertifierError::Upload(format!("unreadable IPFS add response: {e}")))?;

        debug!(
            "Stored {} ({size} bytes) as {}",
            added.name.as_deref().unwrap_or(filename),
            added.hash
        );
        Ok(added.hash)
    }

    fn resolve_url(&self, content_id: &str) -> Option<String> {
        gateway_url(&self.gateway_url, content_id)
    }

    async fn probe(&self, content_id: &str) -> bool {
        let Some(url) = self.resolve_url(content_id) else {
            return false;
        };
        match self.client.head(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Gateway probe of {url} failed: {e}");
                false
            }
        }
    }
}
