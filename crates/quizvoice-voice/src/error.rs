use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmitError),

    #[error("Voice controller has shut down")]
    ControllerClosed,
}

/// Synchronous failure of [`crate::SpeechCapture::start`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureStartError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    #[error("a recognition attempt is already running (generation {0})")]
    AlreadyRunning(u64),

    #[error("recognizer failed to start: {0}")]
    Platform(String),
}

/// Failure to open a microphone stream for level metering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneError {
    #[error("microphone access denied")]
    Denied,

    #[error("no microphone available: {0}")]
    Unavailable(String),
}

/// Transport-level failure talking to a submission API.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: HTTP {0}")]
    Status(u16),

    #[error("unexpected response body: {0}")]
    Decode(String),
}
