//! Companion speech server for QuizVoice.
//!
//! Serves the `POST /tts` endpoint the voice controller's remote synthesizer
//! fetches audio from, plus `POST /asr` for hosts that record audio
//! themselves and a health check.

pub mod api;
pub mod config;
pub mod error;
mod process;
pub mod synth;
pub mod transcribe;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Extension, Router,
};
use config::Config;
use std::sync::Arc;
use synth::Synthesizer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use transcribe::{Transcriber, MAX_ASR_AUDIO_BYTES};

/// Request body ceiling: the largest accepted audio plus multipart overhead.
const MAX_REQUEST_BODY_BYTES: usize = MAX_ASR_AUDIO_BYTES + 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub synthesizer: Synthesizer,
    pub transcriber: Transcriber,
    /// CORS origins; empty allows any.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            synthesizer: Synthesizer::new(config.tts.clone()),
            transcriber: Transcriber::new(config.asr.clone()),
            allowed_origins: config.server.allowed_origins.clone(),
        }
    }
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = cors(&state.allowed_origins);
    Router::new()
        .route("/", get(api::index_handler))
        .route("/health", get(api::health_handler))
        .route("/tts", post(api::tts_handler))
        .route("/asr", post(api::asr_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
