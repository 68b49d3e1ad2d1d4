//! HTTP handlers for the speech server.

use crate::error::SpeechError;
use crate::AppState;
use axum::{
    extract::{Extension, FromRequest, Multipart, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use quizvoice_types::speech::{
    ErrorResponse, HealthResponse, TranscriptionResponse, TtsRequest, MAX_TTS_TEXT_CHARS,
    MIN_ASR_AUDIO_BYTES,
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<SpeechError> for ApiError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::NotConfigured(_) => ApiError::ServiceUnavailable(e.to_string()),
            SpeechError::TooLarge { .. } => ApiError::BadRequest(e.to_string()),
            _ => ApiError::InternalServerError(e.to_string()),
        }
    }
}

/// Handler for `GET /`.
pub async fn index_handler() -> Json<Value> {
    Json(json!({
        "message": "QuizVoice speech server",
        "endpoints": {
            "/tts": "POST - text to speech (WAV)",
            "/asr": "POST - speech to text (JSON)",
            "/health": "GET - health check"
        }
    }))
}

/// Handler for `GET /health`.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        tts_ready: state.synthesizer.is_ready(),
        asr_ready: state.transcriber.is_ready(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// A synthesis request, form-encoded or JSON depending on `Content-Type`.
pub struct TtsInput(pub TtsRequest);

impl<S> FromRequest<S> for TtsInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<TtsRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(body))
        } else {
            let Form(body) = Form::<TtsRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(body))
        }
    }
}

/// Handler for `POST /tts`.
pub async fn tts_handler(
    Extension(state): Extension<Arc<AppState>>,
    TtsInput(request): TtsInput,
) -> Result<Response, ApiError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("No text provided".to_string()));
    }
    if text.chars().count() > MAX_TTS_TEXT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Text too long (max {} chars)",
            MAX_TTS_TEXT_CHARS
        )));
    }

    let preview: String = text.chars().take(60).collect();
    tracing::info!(text = %preview, "TTS request");

    let audio = state.synthesizer.synthesize(text).await.map_err(|e| {
        tracing::error!("TTS failed: {}", e);
        ApiError::from(e)
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "inline; filename=speech.wav"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        audio,
    )
        .into_response())
}

/// Handler for `POST /asr`. Expects a multipart `audio` field.
pub async fn asr_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let mut audio = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        if field.file_name() == Some("") {
            return Err(ApiError::BadRequest("No audio file selected".to_string()));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read audio: {}", e)))?;
        audio = Some(data);
        break;
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;
    if audio.len() < MIN_ASR_AUDIO_BYTES {
        return Err(ApiError::BadRequest("Audio file too small".to_string()));
    }

    tracing::info!(bytes = audio.len(), "ASR request");
    let transcription = state.transcriber.transcribe(&audio).await.map_err(|e| {
        tracing::error!("ASR failed: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(transcription))
}
