//! Speech server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level speech server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Synthesis engine settings.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Transcription engine settings.
    #[serde(default)]
    pub asr: AsrConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "quizvoice_speech=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Which binary synthesizes speech.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsEngine {
    /// Neural voice; raw PCM on stdout, wrapped as WAV here.
    Piper,
    /// `espeak-ng --stdout`; WAV passed through as-is.
    #[default]
    Espeak,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub engine: TtsEngine,

    #[serde(default = "default_piper_binary")]
    pub piper_binary: String,

    /// Path to the piper `.onnx` voice model.
    #[serde(default)]
    pub piper_model: String,

    /// Sample rate of the piper voice, in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_espeak_binary")]
    pub espeak_binary: String,

    /// espeak-ng voice name.
    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsrConfig {
    /// whisper.cpp-compatible binary. Empty disables `/asr`.
    #[serde(default)]
    pub binary: String,

    /// Path to the GGML model.
    #[serde(default = "default_asr_model")]
    pub model: String,

    #[serde(default = "default_asr_language")]
    pub language: String,

    #[serde(default = "default_asr_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_piper_binary() -> String {
    "piper".to_string()
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_espeak_binary() -> String {
    "espeak-ng".to_string()
}

fn default_voice() -> String {
    "en-us".to_string()
}

fn default_tts_timeout_secs() -> u64 {
    60
}

fn default_asr_model() -> String {
    "models/ggml-small.en.bin".to_string()
}

fn default_asr_language() -> String {
    "en".to_string()
}

fn default_asr_timeout_secs() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::default(),
            piper_binary: default_piper_binary(),
            piper_model: String::new(),
            sample_rate: default_sample_rate(),
            espeak_binary: default_espeak_binary(),
            voice: default_voice(),
            timeout_secs: default_tts_timeout_secs(),
        }
    }
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            binary: String::new(),
            model: default_asr_model(),
            language: default_asr_language(),
            timeout_secs: default_asr_timeout_secs(),
        }
    }
}

impl TtsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AsrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `QUIZVOICE_SPEECH_HOST` overrides `server.host`
/// - `QUIZVOICE_SPEECH_PORT` overrides `server.port`
/// - `QUIZVOICE_SPEECH_LOG_LEVEL` overrides `logging.level`
/// - `QUIZVOICE_SPEECH_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides from `lookup`. Unparseable values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("QUIZVOICE_SPEECH_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("QUIZVOICE_SPEECH_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = lookup("QUIZVOICE_SPEECH_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("QUIZVOICE_SPEECH_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
