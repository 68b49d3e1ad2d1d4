//! Voice configuration loading from file and environment variables.

use crate::rules::RulesConfig;
use quizvoice_types::RecognitionOptions;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level voice configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub flow: FlowConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Code rule set. Defaults to the join-code preset.
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Speech recognizer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// BCP 47 language tag passed to the recognizer.
    #[serde(default = "default_language")]
    pub language: String,

    /// Record-and-transcribe command for [`crate::ProcessRecognizer`].
    /// Empty means the host supplies its own recognizer.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Dialog pacing and retry limits.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Failed attempts allowed while listening for the code.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Unclear answers allowed while listening for confirmation.
    #[serde(default = "default_max_retries")]
    pub max_confirm_retries: u32,

    /// Bound on any single load, acquire or hand-off step.
    #[serde(default = "default_safety_timeout_ms")]
    pub safety_timeout_ms: u64,

    /// Bound on one recognition attempt once it has started.
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,

    /// Level meter frame interval.
    #[serde(default = "default_level_frame_ms")]
    pub level_frame_ms: u64,
}

/// Speech output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// Speech server synthesis endpoint. Empty disables the network engine.
    #[serde(default = "default_tts_url")]
    pub remote_url: String,

    /// Local synthesis command; `{text}` is replaced with the utterance.
    #[serde(default = "default_local_command")]
    pub local_command: Vec<String>,

    /// Player fed the speech server's WAV on stdin.
    #[serde(default = "default_player_command")]
    pub player_command: Vec<String>,
}

/// Submission API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_submit_url")]
    pub url: String,
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_safety_timeout_ms() -> u64 {
    8_000
}

fn default_listen_timeout_ms() -> u64 {
    10_000
}

fn default_level_frame_ms() -> u64 {
    16
}

fn default_tts_url() -> String {
    "http://127.0.0.1:5000/tts".to_string()
}

fn default_local_command() -> Vec<String> {
    ["espeak-ng", "-v", "en-us", "-s", "150", "{text}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_player_command() -> Vec<String> {
    ["aplay", "-q", "-"].iter().map(|s| s.to_string()).collect()
}

fn default_submit_url() -> String {
    "http://localhost:3000/api/participants/join".to_string()
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            command: Vec::new(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_confirm_retries: default_max_retries(),
            safety_timeout_ms: default_safety_timeout_ms(),
            listen_timeout_ms: default_listen_timeout_ms(),
            level_frame_ms: default_level_frame_ms(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            remote_url: default_tts_url(),
            local_command: default_local_command(),
            player_command: default_player_command(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            url: default_submit_url(),
        }
    }
}

impl RecognitionConfig {
    /// Options for one recognition attempt: single-shot, final results only.
    pub fn options(&self) -> RecognitionOptions {
        RecognitionOptions {
            language: self.language.clone(),
            ..RecognitionOptions::default()
        }
    }
}

impl FlowConfig {
    pub fn safety_timeout(&self) -> Duration {
        Duration::from_millis(self.safety_timeout_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn level_frame(&self) -> Duration {
        Duration::from_millis(self.level_frame_ms.max(1))
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

    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Loads voice configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `QUIZVOICE_LANGUAGE` overrides `recognition.language`
/// - `QUIZVOICE_MAX_RETRIES` overrides `flow.max_retries`
/// - `QUIZVOICE_SAFETY_TIMEOUT_MS` overrides `flow.safety_timeout_ms`
/// - `QUIZVOICE_TTS_URL` overrides `tts.remote_url`
/// - `QUIZVOICE_SUBMIT_URL` overrides `submission.url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if a retry limit or timeout is zero.
pub fn load_config(path: Option<&Path>) -> Result<VoiceConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %p.display(), "voice config file not found, using defaults");
                VoiceConfig::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => VoiceConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Applies overrides from `lookup`. Unparseable numbers are ignored.
pub fn apply_env_overrides(config: &mut VoiceConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(language) = lookup("QUIZVOICE_LANGUAGE") {
        config.recognition.language = language;
    }
    if let Some(retries) = lookup("QUIZVOICE_MAX_RETRIES") {
        if let Ok(parsed) = retries.parse() {
            config.flow.max_retries = parsed;
        }
    }
    if let Some(timeout) = lookup("QUIZVOICE_SAFETY_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.flow.safety_timeout_ms = parsed;
        }
    }
    if let Some(url) = lookup("QUIZVOICE_TTS_URL") {
        config.tts.remote_url = url;
    }
    if let Some(url) = lookup("QUIZVOICE_SUBMIT_URL") {
        config.submission.url = url;
    }
}

fn validate(config: &VoiceConfig) -> Result<(), ConfigError> {
    if config.flow.max_retries == 0 || config.flow.max_confirm_retries == 0 {
        return Err(ConfigError::Invalid(
            "flow.max_retries and flow.max_confirm_retries must be at least 1".to_string(),
        ));
    }
    if config.flow.safety_timeout_ms == 0 || config.flow.listen_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "flow timeouts must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = VoiceConfig::default();
        assert_eq!(config.flow.max_retries, 3);
        assert_eq!(config.flow.safety_timeout(), Duration::from_secs(8));
        assert_eq!(config.flow.listen_timeout(), Duration::from_secs(10));
        assert_eq!(config.recognition.options().language, "en-US");
        assert!(!config.recognition.options().interim_results);
        assert_eq!(config.tts.player_command, vec!["aplay", "-q", "-"]);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: VoiceConfig = toml::from_str(
            r#"
            [flow]
            max_retries = 5

            [rules]
            preset = "roll_number"
            "#,
        )
        .unwrap();
        assert_eq!(config.flow.max_retries, 5);
        assert_eq!(config.flow.max_confirm_retries, 3);
        assert_eq!(config.rules.preset, crate::rules::RulePreset::RollNumber);
        assert_eq!(config.submission.url, default_submit_url());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("QUIZVOICE_LANGUAGE", "en-IN"),
            ("QUIZVOICE_MAX_RETRIES", "2"),
            ("QUIZVOICE_SAFETY_TIMEOUT_MS", "not-a-number"),
            ("QUIZVOICE_SUBMIT_URL", "http://quiz.local/join"),
        ]
        .into_iter()
        .collect();
        let mut config = VoiceConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.recognition.language, "en-IN");
        assert_eq!(config.flow.max_retries, 2);
        assert_eq!(config.flow.safety_timeout_ms, 8_000);
        assert_eq!(config.submission.url, "http://quiz.local/join");
    }

    #[test]
    fn zero_retries_rejected() {
        let mut config = VoiceConfig::default();
        config.flow.max_retries = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));
    }
}
