//! Secondary audio synthesis stage
//!
//! After a successful remote-backend run the controller hands the analysis to
//! [`AudioTaskPool::schedule`]. The task runs detached from the request that
//! triggered it and only ever writes `musicStatus`, `generatedAudio` and the
//! music error; the main pipeline fields are out of its reach.
//!
//! Concurrency is bounded by a semaphore sized from configuration. A task
//! waiting for a permit is queued (`musicStatus = IDLING`). Each task gets a
//! cancellation token that nothing triggers by default.

use futures::FutureExt;
use klangbild_common::events::{EventBus, KlangbildEvent};
use klangbild_common::StatusCode;
use std::any::Any;
use std::io::Cursor;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::error::StageError;
use crate::models::{MusicTransition, TransactionError};
use crate::services::{AudioClip, MusicModel, MusicRequest};
use crate::store::TransactionStore;

/// Prompt for music generation
pub fn music_prompt(analysis_text: &str) -> String {
    format!(
        "Musikstück basierend auf einer Partitur mit folgenden Elementen und Eigenschaften: {}",
        analysis_text
    )
}

/// Encode mono samples as a 32-bit float WAV file
pub fn encode_wav(clip: &AudioClip) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut buffer = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec)?;
        for sample in &clip.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(buffer)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked".to_string()
    }
}

fn store_error(err: impl std::fmt::Display) -> StageError {
    StageError::AudioSynthesis(err.to_string())
}

/// Handle to one scheduled audio task
///
/// Dropping the handle neither cancels nor joins the task.
pub struct AudioTaskHandle {
    transaction_id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<StatusCode>,
}

impl AudioTaskHandle {
    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    /// Request cancellation; the task ends with `musicStatus = ERROR`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task and return its final music status
    pub async fn wait(self) -> StatusCode {
        self.join.await.unwrap_or(StatusCode::Error)
    }
}

/// Bounded pool running audio synthesis tasks
#[derive(Clone)]
pub struct AudioTaskPool {
    store: TransactionStore,
    model: Arc<dyn MusicModel>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    event_bus: EventBus,
}

impl AudioTaskPool {
    /// `max_concurrent` below 1 is raised to 1
    pub fn new(
        store: TransactionStore,
        model: Arc<dyn MusicModel>,
        max_concurrent: usize,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            model,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker: TaskTracker::new(),
            event_bus,
        }
    }

    /// Queue audio synthesis for a transaction
    ///
    /// Marks the transaction's music stage as queued, then spawns the task on
    /// the current tokio runtime. On error the music stage is already marked
    /// queued; the caller records the failure with [`Self::record_failure`].
    pub fn schedule(
        &self,
        transaction_id: Uuid,
        analysis_text: String,
    ) -> Result<AudioTaskHandle, StageError> {
        let transition = self
            .store
            .update(transaction_id, |tx| tx.transition_music_to(StatusCode::Idling))
            .map_err(|e| StageError::Scheduling(e.to_string()))?
            .map_err(|e| StageError::Scheduling(e.to_string()))?;
        self.emit(transition);

        if self.tracker.is_closed() {
            return Err(StageError::Scheduling(
                "audio task pool is shut down".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StageError::Scheduling(e.to_string()))?;

        let cancel = CancellationToken::new();
        let pool = self.clone();
        let token = cancel.clone();
        let join = self.tracker.spawn_on(
            async move { pool.run(transaction_id, analysis_text, token).await },
            &runtime,
        );

        tracing::info!(transaction_id = %transaction_id, "Music generation scheduled");

        Ok(AudioTaskHandle {
            transaction_id,
            cancel,
            join,
        })
    }

    /// Mark the music stage of a transaction as failed
    ///
    /// A stage that was never queued is queued first so the recorded
    /// sequence stays `IDLING → ERROR`.
    pub fn record_failure(&self, transaction_id: Uuid, error: &StageError) {
        let info = error.to_error_info();
        let result = self.store.update(transaction_id, |tx| {
            let mut transitions = Vec::with_capacity(2);
            if tx.music_status().is_none() {
                transitions.push(tx.transition_music_to(StatusCode::Idling)?);
            }
            transitions.push(tx.fail_music(info)?);
            Ok::<_, TransactionError>(transitions)
        });

        match result {
            Ok(Ok(transitions)) => transitions.into_iter().for_each(|t| self.emit(t)),
            Ok(Err(e)) => tracing::warn!(
                transaction_id = %transaction_id,
                error = %e,
                "Could not record music failure"
            ),
            Err(e) => tracing::warn!(transaction_id = %transaction_id, error = %e, "Could not record music failure"),
        }
    }

    /// Tasks spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Permits currently free
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop accepting tasks and wait for the in-flight ones
    pub async fn shutdown(&self) {
        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "Waiting for audio tasks");
        self.tracker.wait().await;
    }

    async fn run(self, transaction_id: Uuid, analysis_text: String, cancel: CancellationToken) -> StatusCode {
        tracing::info!(transaction_id = %transaction_id, "Starting music generation");

        let outcome = AssertUnwindSafe(self.execute(transaction_id, &analysis_text, &cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::AudioSynthesis(panic_message(&*panic))));

        match outcome {
            Ok(()) => {
                tracing::info!(transaction_id = %transaction_id, "Music generation done");
                StatusCode::Success
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Caught error while generating music"
                );
                self.record_failure(transaction_id, &e);
                StatusCode::Error
            }
        }
    }

    async fn execute(
        &self,
        transaction_id: Uuid,
        analysis_text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|e| StageError::Scheduling(e.to_string()))?
            }
        };

        let transition = self
            .store
            .update(transaction_id, |tx| tx.transition_music_to(StatusCode::RunningGeneration))
            .map_err(store_error)?
            .map_err(store_error)?;
        self.emit(transition);

        let prompt = music_prompt(analysis_text);
        let clip = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
            clip = self.model.generate(MusicRequest::new(&prompt)) => clip?,
        };

        if clip.sample_rate == 0 {
            return Err(StageError::AudioSynthesis("sample rate is zero".to_string()));
        }
        let wav = encode_wav(&clip).map_err(store_error)?;

        let transition = self
            .store
            .update(transaction_id, |tx| tx.complete_with_audio(wav))
            .map_err(store_error)?
            .map_err(store_error)?;
        self.emit(transition);

        Ok(())
    }

    fn emit(&self, transition: MusicTransition) {
        self.event_bus.emit_lossy(KlangbildEvent::MusicStatusChanged {
            transaction_id: transition.transaction_id,
            old_status: transition.old_status,
            new_status: transition.new_status,
            timestamp: transition.transitioned_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_prompt_embeds_analysis() {
        let prompt = music_prompt("Rot (oben): hoch;");
        assert!(prompt.starts_with("Musikstück basierend auf einer Partitur"));
        assert!(prompt.ends_with("Rot (oben): hoch;"));
    }

    #[test]
    fn test_encode_wav_header_and_samples() {
        let clip = AudioClip {
            samples: vec![0.0, 0.5, -0.5, 1.0],
            sample_rate: 32_000,
        };
        let wav = encode_wav(&clip).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 32_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, clip.samples);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("model exploded");
        assert_eq!(panic_message(&*payload), "model exploded");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*payload), "task panicked");
    }
}
