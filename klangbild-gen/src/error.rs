//! Error types for klangbild-gen
//!
//! Three layers:
//! - [`StageError`]: failure of one pipeline stage, recorded on the
//!   transaction and never propagated past the controller
//! - [`ControllerError`]: the only errors a pipeline run returns to its caller
//! - [`ApiError`]: HTTP mapping with a JSON error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ErrorInfo;

/// Generic generation failure (analysis or image synthesis)
pub const OUTPUT_FILE_ERROR: &str = "OUTPUT_FILE_ERROR";
/// Remote asset retrieval failed
pub const ERROR_DOWNLOADING_FILE: &str = "ERROR_DOWNLOADING_FILE";
/// Audio synthesis failed
pub const MUSIC_GENERATION_ERROR: &str = "MUSIC_GENERATION_ERROR";
/// Audio task could not be scheduled
pub const MUSIC_SCHEDULING_ERROR: &str = "MUSIC_SCHEDULING_ERROR";
/// Audio task cancelled through its handle
pub const MUSIC_GENERATION_CANCELLED: &str = "MUSIC_GENERATION_CANCELLED";

/// Failure of a single pipeline stage
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// Vision analysis collaborator failed
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// Either image-synthesis backend failed
    #[error("Image synthesis failed: {0}")]
    Synthesis(String),

    /// Remote asset could not be retrieved or decoded
    #[error("Download failed: {0}")]
    Download(String),

    /// Main pipeline task panicked or was torn down
    #[error("Pipeline aborted: {0}")]
    Aborted(String),

    /// Audio synthesis or encoding failed
    #[error("Audio synthesis failed: {0}")]
    AudioSynthesis(String),

    /// Audio task could not be handed to the pool
    #[error("Scheduling failed: {0}")]
    Scheduling(String),

    /// Audio task cancelled before completion
    #[error("Audio task cancelled")]
    Cancelled,
}

impl StageError {
    /// Stable error code exposed to polling clients
    pub fn error_code(&self) -> &'static str {
        match self {
            StageError::Analysis(_) | StageError::Synthesis(_) | StageError::Aborted(_) => {
                OUTPUT_FILE_ERROR
            }
            StageError::Download(_) => ERROR_DOWNLOADING_FILE,
            StageError::AudioSynthesis(_) => MUSIC_GENERATION_ERROR,
            StageError::Scheduling(_) => MUSIC_SCHEDULING_ERROR,
            StageError::Cancelled => MUSIC_GENERATION_CANCELLED,
        }
    }

    /// Error record stored on the transaction
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Errors returned to the caller of a pipeline run
#[derive(Debug, Error, PartialEq)]
pub enum ControllerError {
    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Transaction {id} already started (status {status})")]
    AlreadyStarted {
        id: Uuid,
        status: klangbild_common::StatusCode,
    },
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. pipeline already started
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ControllerError::AlreadyStarted { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_and_synthesis_share_generic_code() {
        assert_eq!(StageError::Analysis("x".into()).error_code(), OUTPUT_FILE_ERROR);
        assert_eq!(StageError::Synthesis("x".into()).error_code(), OUTPUT_FILE_ERROR);
        assert_eq!(StageError::Aborted("x".into()).error_code(), OUTPUT_FILE_ERROR);
        assert_eq!(StageError::Download("x".into()).error_code(), ERROR_DOWNLOADING_FILE);
    }

    #[test]
    fn test_error_info_carries_code_and_message() {
        let info = StageError::Download("HTTP 404".into()).to_error_info();
        assert_eq!(info.code, ERROR_DOWNLOADING_FILE);
        assert!(info.message.contains("HTTP 404"));
    }

    #[test]
    fn test_controller_error_maps_to_http() {
        let id = Uuid::new_v4();
        let not_found: ApiError = ControllerError::NotFound(id).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let conflict: ApiError = ControllerError::AlreadyStarted {
            id,
            status: klangbild_common::StatusCode::Success,
        }
        .into();
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
    }
}
