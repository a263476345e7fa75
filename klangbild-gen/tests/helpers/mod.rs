//! Test Helper Utilities
//!
//! Shared utilities for testing klangbild-gen: mock collaborators, a local
//! asset server and a pipeline builder wired with mocks.

#![allow(dead_code)]

pub mod asset_server;
pub mod mocks;

pub use asset_server::{sample_png_base64, spawn_asset_server, AssetServer};
pub use mocks::{
    sample_jpeg, sample_png, width_analysis, width_tag, MockAnalyzer, MockImageToImage,
    MockMusicModel, MockTextToImage,
};

use std::sync::Arc;
use std::time::Duration;

use klangbild_common::events::EventBus;
use klangbild_common::StatusCode;
use klangbild_gen::audio_task::AudioTaskPool;
use klangbild_gen::models::Transaction;
use klangbild_gen::pipeline::{PipelineController, PipelineOptions};
use klangbild_gen::services::{AssetFetcher, ImageToImageModel, MusicModel, TextToImageClient, VisionAnalyzer};
use klangbild_gen::store::TransactionStore;
use klangbild_gen::synthesis::{LocalConditionedSynthesizer, RemoteTextToImageSynthesizer, SynthesizerSet};
use klangbild_gen::AppState;
use uuid::Uuid;

/// Analysis text in the format the vision prompt asks for
pub const SAMPLE_ANALYSIS: &str =
    "Gelbe Linie (oben rechts): hoch; Blaue Sonne (unten links): abstrakt, geschwungen;";

/// Collaborators of a test pipeline; every field has a working default
pub struct TestPipelineBuilder {
    pub analyzer: Arc<dyn VisionAnalyzer>,
    pub image_model: Arc<dyn ImageToImageModel>,
    pub text_to_image: Arc<dyn TextToImageClient>,
    pub music: Arc<dyn MusicModel>,
    pub max_concurrent_audio_tasks: usize,
    pub options: PipelineOptions,
}

impl TestPipelineBuilder {
    /// Defaults: analysis succeeds, local model succeeds, remote URL points
    /// nowhere (override for remote tests), music succeeds immediately
    pub fn new() -> Self {
        Self {
            analyzer: Arc::new(MockAnalyzer::succeeding(SAMPLE_ANALYSIS)),
            image_model: Arc::new(MockImageToImage::succeeding()),
            text_to_image: Arc::new(MockTextToImage::returning("http://127.0.0.1:9/none.png")),
            music: Arc::new(MockMusicModel::succeeding()),
            max_concurrent_audio_tasks: 2,
            options: PipelineOptions::default(),
        }
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn VisionAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn image_model(mut self, model: Arc<dyn ImageToImageModel>) -> Self {
        self.image_model = model;
        self
    }

    pub fn text_to_image(mut self, client: Arc<dyn TextToImageClient>) -> Self {
        self.text_to_image = client;
        self
    }

    pub fn music(mut self, music: Arc<dyn MusicModel>) -> Self {
        self.music = music;
        self
    }

    pub fn max_concurrent_audio_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_audio_tasks = max;
        self
    }

    pub fn emit_handoff_marker(mut self, emit: bool) -> Self {
        self.options.emit_handoff_marker = emit;
        self
    }

    pub fn build(self) -> TestPipeline {
        let event_bus = EventBus::new(1000);
        let store = TransactionStore::new();
        let fetcher = AssetFetcher::new(Duration::from_secs(5)).expect("asset fetcher");

        let synthesizers = SynthesizerSet::new(
            Arc::new(LocalConditionedSynthesizer::new(self.image_model)),
            Arc::new(RemoteTextToImageSynthesizer::new(self.text_to_image, fetcher)),
        );
        let audio_pool = AudioTaskPool::new(
            store.clone(),
            self.music,
            self.max_concurrent_audio_tasks,
            event_bus.clone(),
        );

        let controller = Arc::new(PipelineController::new(
            store,
            self.analyzer,
            synthesizers,
            audio_pool,
            event_bus.clone(),
            self.options,
        ));

        TestPipeline {
            controller,
            event_bus,
        }
    }
}

impl Default for TestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller plus the bus it publishes on
pub struct TestPipeline {
    pub controller: Arc<PipelineController>,
    pub event_bus: EventBus,
}

impl TestPipeline {
    pub fn app_state(&self) -> AppState {
        AppState::new(self.controller.clone(), self.event_bus.clone(), 20 * 1024 * 1024)
    }

    pub fn router(&self) -> axum::Router {
        klangbild_gen::build_router(self.app_state())
    }
}

/// Poll until the music status of `id` satisfies `done`
///
/// Panics after `timeout`.
pub async fn wait_for_music<F>(
    controller: &PipelineController,
    id: Uuid,
    timeout: Duration,
    done: F,
) -> Transaction
where
    F: Fn(Option<StatusCode>) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let tx = controller.store().get(id).expect("transaction exists");
        if done(tx.music_status()) {
            return tx;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "Timed out waiting for music status of {} (currently {:?})",
                id,
                tx.music_status()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the music stage of `id` is terminal
pub async fn wait_for_music_terminal(
    controller: &PipelineController,
    id: Uuid,
) -> Transaction {
    wait_for_music(controller, id, Duration::from_secs(10), |status| {
        status.map(StatusCode::is_terminal).unwrap_or(false)
    })
    .await
}
