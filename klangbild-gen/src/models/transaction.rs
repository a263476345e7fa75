//! Transaction record and its lifecycle rules
//!
//! Main pipeline:
//! IDLING → RUNNING_ANALYSIS → IDLING (handoff) → RUNNING_GENERATION → SUCCESS | ERROR
//!
//! Secondary (audio) pipeline, remote backend only:
//! IDLING (queued) → RUNNING_GENERATION → SUCCESS | ERROR
//!
//! Every field is owned by exactly one stage and written at most once. The
//! mutators below enforce that; the store applies them under a per-key lock.

use chrono::{DateTime, Utc};
use klangbild_common::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Image-synthesis backend, fixed when the transaction is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisBackend {
    /// In-process conditioned image-to-image synthesis
    Local,
    /// Remote text-to-image API, followed by audio synthesis
    Remote,
}

impl SynthesisBackend {
    pub fn from_remote_flag(use_remote_variant: bool) -> Self {
        if use_remote_variant {
            SynthesisBackend::Remote
        } else {
            SynthesisBackend::Local
        }
    }

    /// Whether a successful run schedules the secondary audio stage
    pub fn schedules_audio(self) -> bool {
        matches!(self, SynthesisBackend::Remote)
    }
}

/// Error code and message recorded when a stage fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Rejected mutation of a transaction record
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransactionError {
    #[error("Invalid transition {from} → {to}")]
    InvalidTransition { from: StatusCode, to: StatusCode },

    #[error("Invalid music transition {from:?} → {to}")]
    InvalidMusicTransition {
        from: Option<StatusCode>,
        to: StatusCode,
    },

    #[error("Field {0} already written")]
    AlreadyWritten(&'static str),

    #[error("Main pipeline already terminal ({0})")]
    Terminal(StatusCode),
}

/// Status change produced by a successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub transaction_id: Uuid,
    pub old_status: StatusCode,
    pub new_status: StatusCode,
    pub transitioned_at: DateTime<Utc>,
}

/// Music status change produced by a successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicTransition {
    pub transaction_id: Uuid,
    pub old_status: Option<StatusCode>,
    pub new_status: StatusCode,
    pub transitioned_at: DateTime<Utc>,
}

/// One submitted request, from input image to final artifacts
#[derive(Debug, Clone)]
pub struct Transaction {
    id: Uuid,
    backend: SynthesisBackend,
    status: StatusCode,
    music_status: Option<StatusCode>,
    input_image: Vec<u8>,
    analysis_text: Option<String>,
    keywords: Vec<String>,
    result_image: Option<Vec<u8>>,
    generated_audio: Option<Vec<u8>>,
    error_info: Option<ErrorInfo>,
    music_error_info: Option<ErrorInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a fresh transaction in `IDLING`
    pub fn new(input_image: Vec<u8>, backend: SynthesisBackend) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            backend,
            status: StatusCode::Idling,
            music_status: None,
            input_image,
            analysis_text: None,
            keywords: Vec::new(),
            result_image: None,
            generated_audio: None,
            error_info: None,
            music_error_info: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend(&self) -> SynthesisBackend {
        self.backend
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn music_status(&self) -> Option<StatusCode> {
        self.music_status
    }

    pub fn input_image(&self) -> &[u8] {
        &self.input_image
    }

    pub fn analysis_text(&self) -> Option<&str> {
        self.analysis_text.as_deref()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn result_image(&self) -> Option<&[u8]> {
        self.result_image.as_deref()
    }

    pub fn generated_audio(&self) -> Option<&[u8]> {
        self.generated_audio.as_deref()
    }

    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    pub fn music_error_info(&self) -> Option<&ErrorInfo> {
        self.music_error_info.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True until the main pipeline has been claimed by a run
    pub fn is_fresh(&self) -> bool {
        self.status == StatusCode::Idling && self.analysis_text.is_none()
    }

    /// Advance the main pipeline status
    pub fn transition_to(
        &mut self,
        new_status: StatusCode,
    ) -> Result<StatusTransition, TransactionError> {
        if !self.status.can_advance_main(new_status) {
            return Err(TransactionError::InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        let transition = StatusTransition {
            transaction_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        self.updated_at = transition.transitioned_at;
        Ok(transition)
    }

    /// Record the analysis result
    pub fn record_analysis(
        &mut self,
        analysis_text: String,
        keywords: Vec<String>,
    ) -> Result<(), TransactionError> {
        self.ensure_main_writable()?;
        if self.analysis_text.is_some() {
            return Err(TransactionError::AlreadyWritten("analysis_text"));
        }
        self.analysis_text = Some(analysis_text);
        self.keywords = keywords;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the synthesized image and finish the main pipeline
    pub fn complete_with_image(
        &mut self,
        result_image: Vec<u8>,
    ) -> Result<StatusTransition, TransactionError> {
        self.ensure_main_writable()?;
        if self.result_image.is_some() {
            return Err(TransactionError::AlreadyWritten("result_image"));
        }
        let transition = self.transition_to(StatusCode::Success)?;
        self.result_image = Some(result_image);
        Ok(transition)
    }

    /// Record a main pipeline failure
    pub fn fail(&mut self, error: ErrorInfo) -> Result<StatusTransition, TransactionError> {
        self.ensure_main_writable()?;
        let transition = self.transition_to(StatusCode::Error)?;
        self.error_info = Some(error);
        Ok(transition)
    }

    /// Advance the secondary pipeline status
    ///
    /// `None → IDLING` marks the audio stage as scheduled.
    pub fn transition_music_to(
        &mut self,
        new_status: StatusCode,
    ) -> Result<MusicTransition, TransactionError> {
        let allowed = match self.music_status {
            None => new_status == StatusCode::Idling,
            Some(current) => current.can_advance_music(new_status),
        };
        if !allowed {
            return Err(TransactionError::InvalidMusicTransition {
                from: self.music_status,
                to: new_status,
            });
        }

        let transition = MusicTransition {
            transaction_id: self.id,
            old_status: self.music_status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.music_status = Some(new_status);
        self.updated_at = transition.transitioned_at;
        Ok(transition)
    }

    /// Record the generated audio and finish the secondary pipeline
    pub fn complete_with_audio(
        &mut self,
        generated_audio: Vec<u8>,
    ) -> Result<MusicTransition, TransactionError> {
        if self.generated_audio.is_some() {
            return Err(TransactionError::AlreadyWritten("generated_audio"));
        }
        let transition = self.transition_music_to(StatusCode::Success)?;
        self.generated_audio = Some(generated_audio);
        Ok(transition)
    }

    /// Record a secondary pipeline failure
    pub fn fail_music(&mut self, error: ErrorInfo) -> Result<MusicTransition, TransactionError> {
        let transition = self.transition_music_to(StatusCode::Error)?;
        self.music_error_info = Some(error);
        Ok(transition)
    }

    fn ensure_main_writable(&self) -> Result<(), TransactionError> {
        if self.status.is_terminal() {
            Err(TransactionError::Terminal(self.status))
        } else {
            Ok(())
        }
    }
}
