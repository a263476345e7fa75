//! Inference sidecar client
//!
//! The diffusion and music models run in a local inference process that owns
//! the accelerator. This client speaks its JSON protocol:
//!
//! - `POST /img2img` `{prompt, image, strength, guidance_scale}` → `{image}`
//!   (images base64-encoded)
//! - `POST /musicgen` `{prompt, do_sample, guidance_scale, max_new_tokens}` →
//!   `{samples, sample_rate}`

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{AudioClip, ImageToImageModel, ImageToImageRequest, MusicModel, MusicRequest};
use crate::config::InferenceConfig;
use crate::error::StageError;

#[derive(Debug, Serialize)]
struct Img2ImgBody<'a> {
    prompt: &'a str,
    image: String,
    strength: f32,
    guidance_scale: f32,
}

#[derive(Debug, Deserialize)]
struct Img2ImgReply {
    image: String,
}

#[derive(Debug, Serialize)]
struct MusicGenBody<'a> {
    prompt: &'a str,
    do_sample: bool,
    guidance_scale: f32,
    max_new_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MusicGenReply {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Client for the local inference sidecar
pub struct InferenceClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(config: &InferenceConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, String>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let request = self.http_client.post(format!("{}{}", self.base_url, path));
        super::post_json(request, path, body).await
    }
}

#[async_trait]
impl ImageToImageModel for InferenceClient {
    async fn image_to_image(&self, request: ImageToImageRequest<'_>) -> Result<Vec<u8>, StageError> {
        let body = Img2ImgBody {
            prompt: request.prompt,
            image: STANDARD.encode(request.image),
            strength: request.strength,
            guidance_scale: request.guidance_scale,
        };

        let reply: Img2ImgReply = self
            .post_json("/img2img", &body)
            .await
            .map_err(StageError::Synthesis)?;

        STANDARD
            .decode(reply.image.as_bytes())
            .map_err(|e| StageError::Synthesis(format!("invalid base64 image: {}", e)))
    }
}

#[async_trait]
impl MusicModel for InferenceClient {
    async fn generate(&self, request: MusicRequest<'_>) -> Result<AudioClip, StageError> {
        let body = MusicGenBody {
            prompt: request.prompt,
            do_sample: request.do_sample,
            guidance_scale: request.guidance_scale,
            max_new_tokens: request.max_new_tokens,
        };

        let reply: MusicGenReply = self
            .post_json("/musicgen", &body)
            .await
            .map_err(StageError::AudioSynthesis)?;

        Ok(AudioClip {
            samples: reply.samples,
            sample_rate: reply.sample_rate,
        })
    }
}
