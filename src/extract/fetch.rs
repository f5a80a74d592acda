//! Out-of-band asset materialization
//!
//! Downloading a candidate image is the one place the engine leaves the page.
//! Failures here are never fatal: the image chain logs and moves on to the
//! next candidate.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("asset request failed: {0}")]
    Network(String),

    #[error("asset fetch returned status {0}")]
    Status(u16),

    #[error("malformed data URL")]
    MalformedDataUrl,
}

/// Fetches asset bytes by URL.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher used in production.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Decode a `data:` URL in place, without touching the network or the page.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, FetchError> {
    let (header, payload) = url.split_once(',').ok_or(FetchError::MalformedDataUrl)?;
    if header.contains(";base64") {
        BASE64
            .decode(payload.trim())
            .map_err(|_| FetchError::MalformedDataUrl)
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}
