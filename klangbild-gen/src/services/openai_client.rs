//! OpenAI API client
//!
//! Implements [`VisionAnalyzer`] via chat completions with an image part and
//! [`TextToImageClient`] via image generations.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{TextToImageClient, VisionAnalyzer, REMOTE_IMAGE_QUALITY, REMOTE_IMAGE_SIZE};
use crate::config::OpenAiConfig;
use crate::error::StageError;

const USER_AGENT: &str = concat!("klangbild-gen/", env!("CARGO_PKG_VERSION"));

/// Instruction sent with every image. The answer format is what
/// [`crate::keywords::extract_keywords`] parses.
pub const ANALYSIS_PROMPT: &str = "Als musikalische Bilderkennung \
analysiere dieses Bild auf Basis seiner visuellen Eigenschaften, die für die Generierung \
einer musikalischen Partitur relevant sein könnten \
wobei du die gefundenen Eigenschaften in einer komma-getrennten Liste herausschreibst. \
Achte auf verschiedene Farben und interpretiere diese als eigene Musiker. \
Achte besonders auf folgende Eigenschaften und baue sie falls passend ein: abstrakt, chaotisch, duester, freundlich, \
geschwungen, gleichmaessig, hoch, minimalistisch, tief. Beschränke dich jedoch nicht auf diese Eigenschaften. \
Gib das Ergebnis in folgendem Format aus: \
'Farbe Form (Position): Eigenschaften; Farbe Form (Position): Eigenschaften;'. \
Beispiel: 'Gelbe Linie (oben rechts): hoch; Blaue Sonne (unten links): abstrakt, geschwungen;'";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u8,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// MIME type of an encoded image, for the data URL
fn mime_type(image: &[u8]) -> &'static str {
    image::guess_format(image)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg")
}

/// OpenAI API client
pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    vision_model: String,
    image_model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(api_key: String, config: &OpenAiConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            vision_model: config.vision_model.clone(),
            image_model: config.image_model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, String>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key);
        super::post_json(request, path, body).await
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiClient {
    async fn analyze(&self, image: &[u8]) -> Result<String, StageError> {
        let data_url = format!("data:{};base64,{}", mime_type(image), STANDARD.encode(image));
        let request = ChatRequest {
            model: &self.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: ANALYSIS_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
        };

        tracing::info!(model = %self.vision_model, "Calling vision analysis");

        let response: ChatResponse = self
            .post_json("/chat/completions", &request)
            .await
            .map_err(StageError::Analysis)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| StageError::Analysis("response contained no message".to_string()))
    }
}

#[async_trait]
impl TextToImageClient for OpenAiClient {
    async fn generate_image_url(&self, prompt: &str) -> Result<String, StageError> {
        let request = ImageGenerationRequest {
            model: &self.image_model,
            prompt,
            size: REMOTE_IMAGE_SIZE,
            quality: REMOTE_IMAGE_QUALITY,
            n: 1,
        };

        tracing::info!(model = %self.image_model, "Calling remote image generation");

        let response: ImageGenerationResponse = self
            .post_json("/images/generations", &request)
            .await
            .map_err(StageError::Synthesis)?;

        response
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| StageError::Synthesis("response contained no image URL".to_string()))
    }
}
