//! Transaction API handlers
//!
//! POST /transactions, POST /transactions/{id}/start, GET /transactions/{id},
//! GET /transactions/{id}/music

use axum::{
    extract::{Path, State},
    http::{header, StatusCode as HttpStatus},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use klangbild_common::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{SynthesisBackend, TransactionView},
    AppState,
};

/// POST /transactions request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    /// Submitted image, base64
    pub image: String,
    #[serde(default)]
    pub use_remote_variant: bool,
}

/// POST /transactions response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionResponse {
    pub transaction_id: Uuid,
    pub status: StatusCode,
    pub backend: SynthesisBackend,
    pub created_at: DateTime<Utc>,
}

/// POST /transactions
///
/// Store the submitted image. Returns 201 Created with the transaction id.
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> ApiResult<(HttpStatus, Json<CreateTransactionResponse>)> {
    let image = STANDARD
        .decode(request.image.trim().as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("Image is not valid base64: {}", e)))?;

    if image.is_empty() {
        return Err(ApiError::BadRequest("Image is empty".to_string()));
    }
    if image::guess_format(&image).is_err() {
        return Err(ApiError::BadRequest(
            "Payload is not a recognized image format".to_string(),
        ));
    }

    let backend = SynthesisBackend::from_remote_flag(request.use_remote_variant);
    let id = state.controller.submit(image, backend);
    let transaction = state.controller.store().get(id)?;

    tracing::info!(transaction_id = %id, ?backend, "Transaction created");

    Ok((
        HttpStatus::CREATED,
        Json(CreateTransactionResponse {
            transaction_id: id,
            status: transaction.status(),
            backend,
            created_at: transaction.created_at(),
        }),
    ))
}

/// POST /transactions/{id}/start
///
/// Run the main pipeline; responds once it reached SUCCESS or ERROR.
pub async fn start_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<Json<TransactionView>> {
    let transaction = state.controller.run(transaction_id).await?;

    if let Some(error) = transaction.error_info() {
        *state.last_error.write().await =
            Some(format!("{}: {} ({})", transaction_id, error.code, error.message));
    }

    Ok(Json(TransactionView::from(&transaction)))
}

/// GET /transactions/{id}
///
/// Poll transaction progress.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<Json<TransactionView>> {
    let transaction = state.controller.store().get(transaction_id)?;

    tracing::debug!(
        transaction_id = %transaction_id,
        status = %transaction.status(),
        "Status query"
    );

    Ok(Json(TransactionView::from(&transaction)))
}

/// GET /transactions/{id}/music
///
/// Generated audio as `audio/wav`, once available.
pub async fn get_music(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let transaction = state.controller.store().get(transaction_id)?;

    let audio = transaction.generated_audio().ok_or_else(|| {
        ApiError::NotFound(format!(
            "No generated music for transaction {} (music status {:?})",
            transaction_id,
            transaction.music_status()
        ))
    })?;

    Ok(([(header::CONTENT_TYPE, "audio/wav")], audio.to_vec()))
}

/// Build transaction routes
pub fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", post(create_transaction))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route("/transactions/:transaction_id/start", post(start_transaction))
        .route("/transactions/:transaction_id/music", get(get_music))
}
