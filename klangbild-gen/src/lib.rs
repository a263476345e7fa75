//! klangbild-gen library interface
//!
//! Image → analysis → image synthesis → (remote backend) music synthesis,
//! tracked per transaction and exposed over HTTP for polling clients.

pub mod api;
pub mod audio_task;
pub mod config;
pub mod error;
pub mod keywords;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod synthesis;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use klangbild_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::audio_task::AudioTaskPool;
use crate::config::ServiceConfig;
use crate::pipeline::{PipelineController, PipelineOptions};
use crate::services::{AssetFetcher, InferenceClient, OpenAiClient};
use crate::store::TransactionStore;
use crate::synthesis::{LocalConditionedSynthesizer, RemoteTextToImageSynthesizer, SynthesizerSet};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PipelineController>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pipeline error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(controller: Arc<PipelineController>, event_bus: EventBus, max_upload_bytes: usize) -> Self {
        Self {
            controller,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            max_upload_bytes,
        }
    }
}

/// Wire the production collaborators into a controller
pub fn build_controller(
    config: &ServiceConfig,
    openai_api_key: String,
    event_bus: EventBus,
) -> anyhow::Result<PipelineController> {
    let store = TransactionStore::new();
    let openai = Arc::new(OpenAiClient::new(openai_api_key, &config.openai)?);
    let inference = Arc::new(InferenceClient::new(&config.inference)?);
    let fetcher = AssetFetcher::new(Duration::from_secs(config.pipeline.download_timeout_secs))?;

    let synthesizers = SynthesizerSet::new(
        Arc::new(LocalConditionedSynthesizer::new(inference.clone())),
        Arc::new(RemoteTextToImageSynthesizer::new(openai.clone(), fetcher)),
    );
    let audio_pool = AudioTaskPool::new(
        store.clone(),
        inference,
        config.pipeline.max_concurrent_audio_tasks,
        event_bus.clone(),
    );

    Ok(PipelineController::new(
        store,
        openai,
        synthesizers,
        audio_pool,
        event_bus,
        PipelineOptions {
            emit_handoff_marker: config.pipeline.emit_handoff_marker,
        },
    ))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .merge(api::transaction_routes())
        .merge(api::health_routes())
        .route("/events", axum::routing::get(api::event_stream))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
