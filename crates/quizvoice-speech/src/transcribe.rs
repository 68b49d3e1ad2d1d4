use crate::config::AsrConfig;
use crate::error::SpeechError;
use crate::process;
use quizvoice_types::speech::TranscriptionResponse;
use tokio::process::Command;
use tracing::debug;

/// Largest audio payload handed to the transcriber (10 MiB).
pub const MAX_ASR_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Transcribes audio with a whisper.cpp-compatible binary.
///
/// The binary is invoked as `<binary> -m <model> -l <language> -nt -f -`
/// with the audio on stdin, and must print plain text to stdout.
#[derive(Debug, Clone)]
pub struct Transcriber {
    config: AsrConfig,
}

impl Transcriber {
    pub fn new(config: AsrConfig) -> Self {
        Self { config }
    }

    pub fn is_ready(&self) -> bool {
        !self.config.binary.is_empty()
    }

    pub async fn transcribe(&self, audio: &[u8]) -> Result<TranscriptionResponse, SpeechError> {
        if !self.is_ready() {
            return Err(SpeechError::NotConfigured("ASR"));
        }
        if audio.len() > MAX_ASR_AUDIO_BYTES {
            return Err(SpeechError::TooLarge {
                size: audio.len(),
                limit: MAX_ASR_AUDIO_BYTES,
            });
        }

        let program = &self.config.binary;
        let mut command = Command::new(program);
        command
            .arg("-m")
            .arg(&self.config.model)
            .arg("-l")
            .arg(&self.config.language)
            .arg("-nt")
            .arg("-f")
            .arg("-");

        let stdout = process::run(command, program, Some(audio.to_vec()), self.config.timeout()).await?;
        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        debug!(bytes = audio.len(), chars = text.len(), "transcribed");

        Ok(TranscriptionResponse {
            text,
            language: self.config.language.clone(),
        })
    }
}
