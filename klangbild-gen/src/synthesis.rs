//! Image synthesis backends
//!
//! [`ImageSynthesizer`] has one implementation per [`SynthesisBackend`]. The
//! backend is chosen when the transaction is created; a failing backend is a
//! terminal pipeline error, never a reason to try the other one.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StageError;
use crate::models::SynthesisBackend;
use crate::services::asset_fetcher::encode_png;
use crate::services::{
    AssetFetcher, ImageToImageModel, ImageToImageRequest, TextToImageClient,
    IMG2IMG_GUIDANCE_SCALE, IMG2IMG_STRENGTH,
};

/// Prompt shared by both backends
pub fn image_prompt(analysis_text: &str) -> String {
    format!("Schwarzer Hintergrund\n{}", analysis_text)
}

/// Input of one synthesis call
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub analysis_text: &'a str,
    pub input_image: &'a [u8],
}

/// Produces `resultImage` (PNG) from the analysis
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    fn backend(&self) -> SynthesisBackend;

    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Vec<u8>, StageError>;
}

/// Conditioned image-to-image synthesis on the local model
pub struct LocalConditionedSynthesizer {
    model: Arc<dyn ImageToImageModel>,
}

impl LocalConditionedSynthesizer {
    pub fn new(model: Arc<dyn ImageToImageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ImageSynthesizer for LocalConditionedSynthesizer {
    fn backend(&self) -> SynthesisBackend {
        SynthesisBackend::Local
    }

    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Vec<u8>, StageError> {
        let prompt = image_prompt(request.analysis_text);
        tracing::info!("Calling local image-to-image synthesis");

        let image = self
            .model
            .image_to_image(ImageToImageRequest {
                prompt: &prompt,
                image: request.input_image,
                strength: IMG2IMG_STRENGTH,
                guidance_scale: IMG2IMG_GUIDANCE_SCALE,
            })
            .await?;

        encode_png(&image).map_err(|e| StageError::Synthesis(format!("undecodable image: {}", e)))
    }
}

/// Remote text-to-image synthesis followed by asset download
pub struct RemoteTextToImageSynthesizer {
    client: Arc<dyn TextToImageClient>,
    fetcher: AssetFetcher,
}

impl RemoteTextToImageSynthesizer {
    pub fn new(client: Arc<dyn TextToImageClient>, fetcher: AssetFetcher) -> Self {
        Self { client, fetcher }
    }
}

#[async_trait]
impl ImageSynthesizer for RemoteTextToImageSynthesizer {
    fn backend(&self) -> SynthesisBackend {
        SynthesisBackend::Remote
    }

    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Vec<u8>, StageError> {
        let prompt = image_prompt(request.analysis_text);
        let url = self.client.generate_image_url(&prompt).await?;
        tracing::info!(url = %url, "Remote image generation answered");

        self.fetcher.fetch(&url).await
    }
}

/// One synthesizer per backend
#[derive(Clone)]
pub struct SynthesizerSet {
    local: Arc<dyn ImageSynthesizer>,
    remote: Arc<dyn ImageSynthesizer>,
}

impl SynthesizerSet {
    pub fn new(local: Arc<dyn ImageSynthesizer>, remote: Arc<dyn ImageSynthesizer>) -> Self {
        Self { local, remote }
    }

    pub fn for_backend(&self, backend: SynthesisBackend) -> &Arc<dyn ImageSynthesizer> {
        match backend {
            SynthesisBackend::Local => &self.local,
            SynthesisBackend::Remote => &self.remote,
        }
    }
}
