//! Text-to-speech through piper or espeak-ng.

use crate::config::{TtsConfig, TtsEngine};
use crate::error::SpeechError;
use crate::process;
use std::io::Cursor;
use tokio::process::Command;
use tracing::debug;

/// Synthesizes WAV audio with the configured engine.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: TtsConfig,
}

impl Synthesizer {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }

    pub fn engine(&self) -> TtsEngine {
        self.config.engine
    }

    /// Whether the engine has everything it needs to run.
    pub fn is_ready(&self) -> bool {
        match self.config.engine {
            TtsEngine::Piper => {
                !self.config.piper_binary.is_empty() && !self.config.piper_model.is_empty()
            }
            TtsEngine::Espeak => !self.config.espeak_binary.is_empty(),
        }
    }

    /// Speaks `text` and returns a complete WAV file.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        if !self.is_ready() {
            return Err(SpeechError::NotConfigured("TTS"));
        }
        let wav = match self.config.engine {
            TtsEngine::Piper => {
                let pcm = self.piper(text).await?;
                pcm_to_wav(&pcm, self.config.sample_rate)?
            }
            TtsEngine::Espeak => self.espeak(text).await?,
        };
        debug!(engine = ?self.config.engine, bytes = wav.len(), "synthesized");
        Ok(wav)
    }

    async fn piper(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let program = &self.config.piper_binary;
        let mut command = Command::new(program);
        command
            .arg("--model")
            .arg(&self.config.piper_model)
            .arg("--output_raw");

        let pcm = process::run(
            command,
            program,
            Some(text.as_bytes().to_vec()),
            self.config.timeout(),
        )
        .await?;
        if pcm.len() < 2 {
            return Err(SpeechError::NoAudio(program.clone()));
        }
        Ok(pcm)
    }

    async fn espeak(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let program = &self.config.espeak_binary;
        let mut command = Command::new(program);
        command
            .arg("-v")
            .arg(&self.config.voice)
            .arg("--stdout")
            .arg(text);

        let wav = process::run(command, program, None, self.config.timeout()).await?;
        if wav.is_empty() {
            return Err(SpeechError::NoAudio(program.clone()));
        }
        Ok(wav)
    }
}

/// Wraps raw mono s16le PCM in a WAV container.
///
/// A trailing odd byte is dropped.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, SpeechError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec)?;
        for chunk in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(buffer.into_inner())
}
