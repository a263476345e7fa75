//! Pipeline controller
//!
//! Drives one transaction through the main pipeline:
//!
//! ```text
//! claim → RUNNING_ANALYSIS → (analysis) → IDLING handoff
//!       → RUNNING_GENERATION → (synthesis) → SUCCESS
//!                                          ↘ ERROR (any stage failure)
//! SUCCESS + remote backend → audio task scheduled on the pool
//! ```
//!
//! The controller is the failure boundary of the main pipeline: stage errors
//! and panics are recorded on the transaction and never returned. Only an unknown id or
//! a transaction that was already started come back to the caller.

use futures::FutureExt;
use klangbild_common::events::{EventBus, KlangbildEvent};
use klangbild_common::StatusCode;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

use crate::audio_task::{panic_message, AudioTaskPool};
use crate::error::{ControllerError, StageError};
use crate::keywords::extract_keywords;
use crate::models::{StatusTransition, SynthesisBackend, Transaction, TransactionError};
use crate::services::VisionAnalyzer;
use crate::store::TransactionStore;
use crate::synthesis::{SynthesisRequest, SynthesizerSet};

/// Controller behavior switches
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Pass through `IDLING` between analysis and generation
    pub emit_handoff_marker: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            emit_handoff_marker: true,
        }
    }
}

/// Orchestrates analysis, synthesis and audio scheduling
pub struct PipelineController {
    store: TransactionStore,
    analyzer: Arc<dyn VisionAnalyzer>,
    synthesizers: SynthesizerSet,
    audio_pool: AudioTaskPool,
    event_bus: EventBus,
    options: PipelineOptions,
}

impl PipelineController {
    pub fn new(
        store: TransactionStore,
        analyzer: Arc<dyn VisionAnalyzer>,
        synthesizers: SynthesizerSet,
        audio_pool: AudioTaskPool,
        event_bus: EventBus,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            analyzer,
            synthesizers,
            audio_pool,
            event_bus,
            options,
        }
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn audio_pool(&self) -> &AudioTaskPool {
        &self.audio_pool
    }

    /// Create a transaction and announce it
    pub fn submit(&self, input_image: Vec<u8>, backend: SynthesisBackend) -> Uuid {
        let id = self.store.create(input_image, backend);
        self.event_bus.emit_lossy(KlangbildEvent::TransactionCreated {
            transaction_id: id,
            remote_variant: backend == SynthesisBackend::Remote,
            timestamp: chrono::Utc::now(),
        });
        id
    }

    /// Run the main pipeline of `id` to a terminal status
    ///
    /// Returns the transaction as it was when the main pipeline finished; the
    /// audio stage may still be running. The stages run on a detached task,
    /// so dropping the returned future does not stop the transaction from
    /// reaching `SUCCESS` or `ERROR`.
    pub async fn run(self: &Arc<Self>, id: Uuid) -> Result<Transaction, ControllerError> {
        let (image, backend) = self.claim(id)?;
        tracing::info!(transaction_id = %id, ?backend, "Pipeline started");

        let controller = Arc::clone(self);
        let driver = tokio::spawn(async move { controller.drive(id, image, backend).await });
        if let Err(e) = driver.await {
            tracing::error!(transaction_id = %id, error = %e, "Pipeline task did not complete");
            self.record_failure(id, &StageError::Aborted(e.to_string()));
        }

        let transaction = self.store.get(id)?;
        tracing::info!(transaction_id = %id, status = %transaction.status(), "Pipeline finished");
        Ok(transaction)
    }

    /// Execute the stages of a claimed transaction and record the outcome
    async fn drive(&self, id: Uuid, image: Vec<u8>, backend: SynthesisBackend) {
        let outcome = AssertUnwindSafe(self.execute(id, &image, backend))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::Aborted(panic_message(&*panic))));

        match outcome {
            Ok(analysis_text) => {
                if backend.schedules_audio() {
                    if let Err(e) = self.audio_pool.schedule(id, analysis_text) {
                        tracing::error!(
                            transaction_id = %id,
                            error = %e,
                            "Caught error while scheduling music generation"
                        );
                        self.audio_pool.record_failure(id, &e);
                    }
                }
            }
            Err(e) => {
                tracing::error!(transaction_id = %id, error = %e, "Pipeline stage failed");
                self.record_failure(id, &e);
            }
        }
    }

    /// Claim a fresh transaction: `IDLING → RUNNING_ANALYSIS`
    fn claim(&self, id: Uuid) -> Result<(Vec<u8>, SynthesisBackend), ControllerError> {
        let claimed = self.store.update(id, |tx| {
            if !tx.is_fresh() {
                return Err(ControllerError::AlreadyStarted {
                    id,
                    status: tx.status(),
                });
            }
            let transition = tx
                .transition_to(StatusCode::RunningAnalysis)
                .map_err(|_| ControllerError::AlreadyStarted {
                    id,
                    status: tx.status(),
                })?;
            Ok((tx.input_image().to_vec(), tx.backend(), transition))
        })??;

        let (image, backend, transition) = claimed;
        self.emit(transition);
        Ok((image, backend))
    }

    /// Analysis and synthesis; returns the analysis text on success
    async fn execute(
        &self,
        id: Uuid,
        image: &[u8],
        backend: SynthesisBackend,
    ) -> Result<String, StageError> {
        tracing::info!(transaction_id = %id, "Calling vision analysis");
        let analysis_text = self.analyzer.analyze(image).await?;
        let keywords = extract_keywords(&analysis_text);
        tracing::debug!(transaction_id = %id, keywords = ?keywords, "Analysis parsed");

        let emit_handoff = self.options.emit_handoff_marker;
        let transitions = self.apply(id, StageError::Analysis, |tx| {
            tx.record_analysis(analysis_text.clone(), keywords)?;
            let mut transitions = Vec::with_capacity(2);
            if emit_handoff {
                transitions.push(tx.transition_to(StatusCode::Idling)?);
            }
            Ok(transitions)
        })?;
        transitions.into_iter().for_each(|t| self.emit(t));

        let transition = self.apply(id, StageError::Synthesis, |tx| {
            tx.transition_to(StatusCode::RunningGeneration)
        })?;
        self.emit(transition);

        let synthesizer = self.synthesizers.for_backend(backend);
        let result_image = synthesizer
            .synthesize(SynthesisRequest {
                analysis_text: &analysis_text,
                input_image: image,
            })
            .await?;

        let transition = self.apply(id, StageError::Synthesis, |tx| {
            tx.complete_with_image(result_image)
        })?;
        self.emit(transition);

        Ok(analysis_text)
    }

    /// Apply a record mutation, mapping rejections to the stage's error
    fn apply<R>(
        &self,
        id: Uuid,
        stage_error: fn(String) -> StageError,
        mutation: impl FnOnce(&mut Transaction) -> Result<R, TransactionError>,
    ) -> Result<R, StageError> {
        self.store
            .update(id, mutation)
            .map_err(|e| stage_error(e.to_string()))?
            .map_err(|e| stage_error(e.to_string()))
    }

    fn record_failure(&self, id: Uuid, error: &StageError) {
        let info = error.to_error_info();
        match self.store.update(id, |tx| tx.fail(info)) {
            Ok(Ok(transition)) => self.emit(transition),
            Ok(Err(e)) => tracing::warn!(transaction_id = %id, error = %e, "Could not record failure"),
            Err(e) => tracing::warn!(transaction_id = %id, error = %e, "Could not record failure"),
        }
    }

    fn emit(&self, transition: StatusTransition) {
        tracing::debug!(
            transaction_id = %transition.transaction_id,
            old = %transition.old_status,
            new = %transition.new_status,
            "Status transition"
        );
        self.event_bus.emit_lossy(KlangbildEvent::StatusChanged {
            transaction_id: transition.transaction_id,
            old_status: transition.old_status,
            new_status: transition.new_status,
            timestamp: transition.transitioned_at,
        });
    }
}
