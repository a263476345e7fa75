//! Transport representation of a transaction
//!
//! Binary payloads are base64-encoded (standard alphabet) when they cross the
//! process boundary.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use klangbild_common::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ErrorInfo, SynthesisBackend, Transaction};

/// GET /transactions/{id} response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: Uuid,
    pub backend: SynthesisBackend,
    pub status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_status: Option<StatusCode>,
    pub analysis: Option<String>,
    pub keywords: Vec<String>,
    /// Result image, base64 PNG
    pub result_image: Option<String>,
    /// Generated audio, base64 WAV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_music: Option<String>,
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id(),
            backend: tx.backend(),
            status: tx.status(),
            music_status: tx.music_status(),
            analysis: tx.analysis_text().map(str::to_string),
            keywords: tx.keywords().to_vec(),
            result_image: tx.result_image().map(|bytes| STANDARD.encode(bytes)),
            generated_music: tx.generated_audio().map(|bytes| STANDARD.encode(bytes)),
            error: tx.error_info().cloned(),
            music_error: tx.music_error_info().cloned(),
            created_at: tx.created_at(),
            updated_at: tx.updated_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_encodes_payloads_and_omits_music_for_local() {
        let mut tx = Transaction::new(vec![1, 2, 3], SynthesisBackend::Local);
        tx.transition_to(StatusCode::RunningGeneration).unwrap();
        tx.complete_with_image(b"png".to_vec()).unwrap();

        let json = serde_json::to_value(TransactionView::from(&tx)).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["backend"], "local");
        assert_eq!(json["resultImage"], STANDARD.encode(b"png"));
        assert!(json.get("musicStatus").is_none());
        assert!(json.get("generatedMusic").is_none());
        assert!(json["error"].is_null());
    }
}
