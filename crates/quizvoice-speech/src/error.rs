use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("{0} engine is not configured")]
    NotConfigured(&'static str),

    #[error("input exceeds maximum size: {size} bytes (limit: {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("{0} produced no audio")]
    NoAudio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
}
