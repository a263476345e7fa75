//! Remote asset retrieval
//!
//! Downloads a generated image by URL and normalizes it to PNG, the stored
//! format of `resultImage`. A non-success response is terminal: no retry.

use std::io::Cursor;
use std::time::Duration;

use image::ImageFormat;

use crate::error::StageError;

const USER_AGENT: &str = concat!("klangbild-gen/", env!("CARGO_PKG_VERSION"));

/// Decode any supported image and re-encode it as PNG
pub fn encode_png(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut buffer = Cursor::new(Vec::new());
    decoded.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// HTTP asset fetcher
#[derive(Clone)]
pub struct AssetFetcher {
    http_client: reqwest::Client,
}

impl AssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, StageError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| StageError::Download(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// GET `url` and return the payload as PNG bytes
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError> {
        tracing::debug!(url = %url, "Downloading generated asset");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| StageError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(url = %url, status = %status, "Error while downloading image");
            return Err(StageError::Download(format!("HTTP {} from {}", status, url)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| StageError::Download(e.to_string()))?;

        encode_png(&body).map_err(|e| StageError::Download(format!("undecodable image: {}", e)))
    }
}
