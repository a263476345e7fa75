//! Mock collaborators for pipeline tests

use async_trait::async_trait;
use image::ImageFormat;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use klangbild_gen::error::StageError;
use klangbild_gen::services::{
    AudioClip, ImageToImageModel, ImageToImageRequest, MusicModel, MusicRequest,
    TextToImageClient, VisionAnalyzer,
};

/// Solid-color PNG
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([20, 120, 220]));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .expect("encode png");
    buffer.into_inner()
}

/// Solid-color JPEG
pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([220, 40, 10]));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Jpeg)
        .expect("encode jpeg");
    buffer.into_inner()
}

// ============================================================================
// Vision analysis
// ============================================================================

enum AnalyzerReply {
    Fixed(Result<String, StageError>),
    /// Analysis naming the width of the input image
    ImageWidth,
    Panic,
}

pub struct MockAnalyzer {
    reply: AnalyzerReply,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    fn with_reply(reply: AnalyzerReply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(text: &str) -> Self {
        Self::with_reply(AnalyzerReply::Fixed(Ok(text.to_string())))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(AnalyzerReply::Fixed(Err(StageError::Analysis(message.to_string()))))
    }

    /// Replies with [`width_analysis`] of the submitted image
    pub fn by_image_width() -> Self {
        Self::with_reply(AnalyzerReply::ImageWidth)
    }

    pub fn panicking() -> Self {
        Self::with_reply(AnalyzerReply::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Analysis text tagged with `width`
pub fn width_analysis(width: u32) -> String {
    format!("Form {width} (mitte): kante{width}, ton{width};")
}

/// Tag written by [`width_analysis`], recovered from any text embedding it
pub fn width_tag(text: &str) -> Option<u32> {
    let start = text.find("Form ")? + "Form ".len();
    text[start..]
        .split_whitespace()
        .next()
        .and_then(|tag| tag.parse().ok())
}

#[async_trait]
impl VisionAnalyzer for MockAnalyzer {
    async fn analyze(&self, image: &[u8]) -> Result<String, StageError> {
        assert!(!image.is_empty(), "analyzer received empty image");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            AnalyzerReply::Fixed(reply) => reply.clone(),
            AnalyzerReply::ImageWidth => {
                let decoded = image::load_from_memory(image).expect("decodable input");
                Ok(width_analysis(decoded.width()))
            }
            AnalyzerReply::Panic => panic!("vision model exploded"),
        }
    }
}

// ============================================================================
// Local image-to-image model
// ============================================================================

pub struct MockImageToImage {
    reply: Result<Vec<u8>, StageError>,
    echo: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockImageToImage {
    pub fn succeeding() -> Self {
        Self::returning(sample_jpeg(16, 16))
    }

    pub fn returning(image: Vec<u8>) -> Self {
        Self {
            reply: Ok(image),
            echo: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Returns the conditioning image unchanged
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::returning(Vec::new())
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(StageError::Synthesis(message.to_string())),
            echo: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageToImageModel for MockImageToImage {
    async fn image_to_image(&self, request: ImageToImageRequest<'_>) -> Result<Vec<u8>, StageError> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        if self.echo {
            return Ok(request.image.to_vec());
        }
        self.reply.clone()
    }
}

// ============================================================================
// Remote text-to-image API
// ============================================================================

pub struct MockTextToImage {
    reply: Result<String, StageError>,
    sized_base: Option<String>,
    calls: AtomicUsize,
}

impl MockTextToImage {
    pub fn returning(url: &str) -> Self {
        Self {
            reply: Ok(url.to_string()),
            sized_base: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Points at `{base}/sized/{width}` for the width tag in the prompt
    pub fn sized_by_prompt(base: &str) -> Self {
        Self {
            sized_base: Some(base.to_string()),
            ..Self::returning("")
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(StageError::Synthesis(message.to_string())),
            sized_base: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextToImageClient for MockTextToImage {
    async fn generate_image_url(&self, prompt: &str) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(base) = &self.sized_base {
            let width = width_tag(prompt).expect("prompt carries a width tag");
            return Ok(format!("{}/sized/{}", base, width));
        }
        self.reply.clone()
    }
}

// ============================================================================
// Music model
// ============================================================================

enum MusicBehavior {
    Succeed,
    /// One sample per unit of the width tag in the prompt
    SamplesByWidth,
    Fail(String),
    Panic,
    ZeroSampleRate,
}

/// Music model with optional gating and concurrency tracking
///
/// A gated model blocks every call until [`MockMusicModel::release`] hands
/// out a permit.
pub struct MockMusicModel {
    behavior: MusicBehavior,
    gate: Option<Arc<Semaphore>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl MockMusicModel {
    fn with_behavior(behavior: MusicBehavior) -> Self {
        Self {
            behavior,
            gate: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_behavior(MusicBehavior::Succeed)
    }

    pub fn failing(message: &str) -> Self {
        Self::with_behavior(MusicBehavior::Fail(message.to_string()))
    }

    pub fn panicking() -> Self {
        Self::with_behavior(MusicBehavior::Panic)
    }

    pub fn samples_by_width() -> Self {
        Self::with_behavior(MusicBehavior::SamplesByWidth)
    }

    pub fn zero_sample_rate() -> Self {
        Self::with_behavior(MusicBehavior::ZeroSampleRate)
    }

    /// Succeeding model that waits for [`Self::release`]
    pub fn gated() -> Self {
        Self::succeeding().with_gate()
    }

    /// Block every call until [`Self::release`]
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` blocked or future calls proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MusicModel for MockMusicModel {
    async fn generate(&self, request: MusicRequest<'_>) -> Result<AudioClip, StageError> {
        assert!(request.prompt.starts_with("Musikstück"));
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }

        match &self.behavior {
            MusicBehavior::Succeed => Ok(AudioClip {
                samples: vec![0.0, 0.1, -0.1, 0.2, -0.2],
                sample_rate: 32_000,
            }),
            MusicBehavior::SamplesByWidth => {
                let width = width_tag(request.prompt).expect("prompt carries a width tag");
                Ok(AudioClip {
                    samples: vec![0.5; width as usize],
                    sample_rate: 32_000,
                })
            }
            MusicBehavior::Fail(message) => Err(StageError::AudioSynthesis(message.clone())),
            MusicBehavior::Panic => panic!("music model exploded"),
            MusicBehavior::ZeroSampleRate => Ok(AudioClip {
                samples: vec![0.0],
                sample_rate: 0,
            }),
        }
    }
}
