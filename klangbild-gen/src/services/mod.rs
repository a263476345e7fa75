//! External collaborators
//!
//! The pipeline reaches every model through one of the traits below. HTTP
//! implementations:
//! - [`OpenAiClient`]: vision analysis and remote text-to-image
//! - [`InferenceClient`]: local diffusion and music models hosted by the
//!   inference sidecar
//! - [`AssetFetcher`]: retrieval of remotely generated images

pub mod asset_fetcher;
pub mod inference_client;
pub mod openai_client;

pub use asset_fetcher::AssetFetcher;
pub use inference_client::InferenceClient;
pub use openai_client::OpenAiClient;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StageError;

/// Fixed strength for conditioned image-to-image synthesis
pub const IMG2IMG_STRENGTH: f32 = 0.75;
/// Fixed guidance scale for conditioned image-to-image synthesis
pub const IMG2IMG_GUIDANCE_SCALE: f32 = 7.5;
/// Fixed output resolution of the remote text-to-image API
pub const REMOTE_IMAGE_SIZE: &str = "1024x1024";
/// Fixed quality tier of the remote text-to-image API
pub const REMOTE_IMAGE_QUALITY: &str = "standard";
/// Fixed guidance scale for music generation
pub const MUSIC_GUIDANCE_SCALE: f32 = 3.0;
/// Token budget for music generation
pub const MUSIC_MAX_NEW_TOKENS: u32 = 1024;

/// Vision analysis of the submitted image
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Analyze image bytes, returning free-form text
    async fn analyze(&self, image: &[u8]) -> Result<String, StageError>;
}

/// Parameters of one conditioned image-to-image call
#[derive(Debug, Clone, Copy)]
pub struct ImageToImageRequest<'a> {
    pub prompt: &'a str,
    pub image: &'a [u8],
    pub strength: f32,
    pub guidance_scale: f32,
}

/// Local conditioned image-to-image model
#[async_trait]
pub trait ImageToImageModel: Send + Sync {
    /// Returns encoded image bytes (any format the `image` crate decodes)
    async fn image_to_image(&self, request: ImageToImageRequest<'_>) -> Result<Vec<u8>, StageError>;
}

/// Remote text-to-image API
#[async_trait]
pub trait TextToImageClient: Send + Sync {
    /// Returns the URL of the generated image
    async fn generate_image_url(&self, prompt: &str) -> Result<String, StageError>;
}

/// Parameters of one music generation call
#[derive(Debug, Clone, Copy)]
pub struct MusicRequest<'a> {
    pub prompt: &'a str,
    pub do_sample: bool,
    pub guidance_scale: f32,
    pub max_new_tokens: u32,
}

impl<'a> MusicRequest<'a> {
    /// Request with the fixed generation parameters
    pub fn new(prompt: &'a str) -> Self {
        Self {
            prompt,
            do_sample: true,
            guidance_scale: MUSIC_GUIDANCE_SCALE,
            max_new_tokens: MUSIC_MAX_NEW_TOKENS,
        }
    }
}

/// Raw mono audio produced by the music model
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Text-conditioned music model
#[async_trait]
pub trait MusicModel: Send + Sync {
    async fn generate(&self, request: MusicRequest<'_>) -> Result<AudioClip, StageError>;
}

/// Send `body` as JSON and decode a JSON reply
///
/// `path` only labels error messages. Non-2xx replies become an error that
/// carries the status and the response body.
pub(crate) async fn post_json<B, R>(
    request: reqwest::RequestBuilder,
    path: &str,
    body: &B,
) -> Result<R, String>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| format!("request to {} failed: {}", path, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("{} returned HTTP {}: {}", path, status, body));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| format!("invalid response from {}: {}", path, e))
}
