//! Speech-to-text via an OpenAI-compatible `/audio/transcriptions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::errors::InferenceError;
use super::types::TranscriptionResponse;
use crate::config::TranscriptionConfig;

/// Turns recorded audio into text.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, InferenceError>;
}

/// [`SpeechTranscriber`] posting multipart audio to a Whisper-style API.
pub struct HttpTranscriber {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpTranscriber {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            url: format!("{}/audio/transcriptions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl SpeechTranscriber for HttpTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, InferenceError> {
        if audio.is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "empty audio file".into(),
            });
        }

        let size = audio.len();
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", Part::bytes(audio).file_name(filename.to_string()));

        let mut request = self.http.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(bytes = size, model = %self.model, "sending audio for transcription");
        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::from_send(&self.url, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| InferenceError::ResponseError {
                reason: format!("failed to parse transcription: {e}"),
            })?;
        Ok(parsed.text.trim().to_string())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn_transcription_server() -> String {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|mut multipart: Multipart| async move {
                let mut model = String::new();
                let mut size = 0;
                while let Ok(Some(field)) = multipart.next_field().await {
                    match field.name() {
                        Some("model") => model = field.text().await.unwrap_or_default(),
                        Some("file") => size = field.bytes().await.map(|b| b.len()).unwrap_or(0),
                        _ => {}
                    }
                }
                Json(serde_json::json!({"text": format!(" {model} heard {size} bytes ")}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/")
    }

    fn config(base_url: &str) -> TranscriptionConfig {
        TranscriptionConfig {
            base_url: base_url.to_string(),
            model: "whisper-1".into(),
            api_key: Some("sk-test".into()),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_transcribe_multipart() {
        let base = spawn_transcription_server().await;
        let transcriber = HttpTranscriber::from_config(&config(&base)).unwrap();
        let text = transcriber
            .transcribe(vec![1, 2, 3, 4], "clip.webm")
            .await
            .unwrap();
        assert_eq!(text, "whisper-1 heard 4 bytes");
    }

    #[tokio::test]
    async fn test_transcribe_rejects_empty_audio() {
        let transcriber = HttpTranscriber::from_config(&config("http://127.0.0.1:1")).unwrap();
        assert!(transcriber.transcribe(Vec::new(), "a.webm").await.is_err());
    }
}
