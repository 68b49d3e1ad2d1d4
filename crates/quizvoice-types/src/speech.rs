//! Wire types for the companion speech server.
//!
//! `POST /tts` takes a [`TtsRequest`] (form-encoded or JSON) and answers with
//! a WAV clip. `POST /asr` takes a multipart `audio` field and answers with a
//! [`TranscriptionResponse`].

use serde::{Deserialize, Serialize};

/// Maximum text length accepted by `POST /tts`, in characters.
pub const MAX_TTS_TEXT_CHARS: usize = 1000;

/// Smallest audio payload accepted by `POST /asr`, in bytes.
pub const MIN_ASR_AUDIO_BYTES: usize = 100;

/// Body of a synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsRequest {
    /// Text to speak.
    #[serde(default)]
    pub text: String,
}

/// Body of a successful transcription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    /// Transcribed text, trimmed.
    pub text: String,
    /// Language the engine transcribed in.
    pub language: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when the server answers.
    pub status: String,
    /// A synthesis engine is configured.
    pub tts_ready: bool,
    /// A transcription engine is configured.
    pub asr_ready: bool,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Error body returned by the speech server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
