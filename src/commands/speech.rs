//! Speech-to-text endpoint.

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};

use super::{ApiError, AppState};

const DEFAULT_FILENAME: &str = "audio.webm";

/// `POST /speech-to-text`: multipart upload with the audio in `file`.
pub async fn speech_to_text(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let Some(transcriber) = state.transcriber.clone() else {
        return Err(ApiError::internal("Speech transcription is not configured on server."));
    };

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read audio file: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, audio)) = upload else {
        return Err(ApiError::bad_request("No audio file found in the request."));
    };
    if audio.is_empty() {
        return Err(ApiError::bad_request("Empty audio file"));
    }

    tracing::info!(bytes = audio.len(), filename = %filename, "transcribing audio");
    let text = transcriber
        .transcribe(audio.to_vec(), &filename)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "text": text })))
}
