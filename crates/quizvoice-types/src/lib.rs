//! Shared types for the QuizVoice workspace.
//!
//! This crate holds the plain data that crosses crate boundaries: the voice
//! dialog steps, microphone permission states, recognizer error kinds, the
//! observable [`VoiceSession`] snapshot, and the wire types spoken by the
//! companion speech server.
//!
//! Nothing here performs I/O. Every type is `serde`-serializable so hosts
//! can forward session snapshots to a UI layer as JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Steps of the voice code-acquisition dialog.
///
/// The initial step is [`VoiceStep::Idle`]. Terminal steps are
/// [`VoiceStep::Submitted`] (success) and [`VoiceStep::Failed`], which
/// requires an explicit restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStep {
    /// No flow is running.
    #[default]
    Idle,
    /// The intro prompt is being spoken.
    Greeting,
    /// Waiting for the participant to speak the code.
    ListeningForCode,
    /// The recognized code is being read back together with the
    /// confirmation question.
    AwaitingConfirmTts,
    /// Waiting for a yes/no answer.
    ListeningForConfirm,
    /// The code was confirmed; the success message is being spoken.
    Accepted,
    /// The code was handed to the submission API.
    Submitting,
    /// The submission API accepted the code.
    Submitted,
    /// Retries were exhausted or recognition is impossible.
    Failed,
}

impl VoiceStep {
    /// Returns the canonical string label for this step.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Greeting => "greeting",
            Self::ListeningForCode => "listening_for_code",
            Self::AwaitingConfirmTts => "awaiting_confirm_tts",
            Self::ListeningForConfirm => "listening_for_confirm",
            Self::Accepted => "accepted",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
        }
    }

    /// Whether this step waits on the speech recognizer.
    pub fn is_listening(self) -> bool {
        matches!(self, Self::ListeningForCode | Self::ListeningForConfirm)
    }

    /// Whether the candidate code is frozen in this step.
    pub fn is_committed(self) -> bool {
        matches!(self, Self::Accepted | Self::Submitting | Self::Submitted)
    }
}

impl std::fmt::Display for VoiceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VoiceStep {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "greeting" => Ok(Self::Greeting),
            "listening_for_code" => Ok(Self::ListeningForCode),
            "awaiting_confirm_tts" => Ok(Self::AwaitingConfirmTts),
            "listening_for_confirm" => Ok(Self::ListeningForConfirm),
            "accepted" => Ok(Self::Accepted),
            "submitting" => Ok(Self::Submitting),
            "submitted" => Ok(Self::Submitted),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseLabelError {
                kind: "voice step",
                value: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an unknown label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseLabelError {
    /// What was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Microphone access as observed by the level monitor or the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicPermission {
    /// Not yet requested.
    #[default]
    Unknown,
    /// A stream was acquired.
    Granted,
    /// The user or platform refused access.
    Denied,
    /// No capture device could be opened.
    Unavailable,
}

/// Error kinds surfaced by a speech recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureErrorKind {
    /// The recognizer heard nothing.
    NoSpeechDetected,
    /// No microphone could be opened.
    AudioCaptureUnavailable,
    /// Microphone access was refused.
    PermissionDenied,
    /// The recognition service could not be reached.
    NetworkError,
    /// Recognition was stopped on request.
    Aborted,
    /// Anything else.
    Unknown,
}

/// How the controller reacts to a [`CaptureErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried automatically with a spoken explanation, up to the cap.
    Recoverable,
    /// Surfaced to the user; waits for a manual retry.
    Blocking,
    /// Not an error at all.
    UserAbort,
}

impl CaptureErrorKind {
    /// Maps a platform error code (`no-speech`, `not-allowed`, ...) onto a kind.
    ///
    /// Unrecognized codes map to [`CaptureErrorKind::Unknown`].
    pub fn from_platform_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeechDetected,
            "audio-capture" => Self::AudioCaptureUnavailable,
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "network" => Self::NetworkError,
            "aborted" => Self::Aborted,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoSpeechDetected => "no_speech_detected",
            Self::AudioCaptureUnavailable => "audio_capture_unavailable",
            Self::PermissionDenied => "permission_denied",
            Self::NetworkError => "network_error",
            Self::Aborted => "aborted",
            Self::Unknown => "unknown",
        }
    }

    /// Classifies this kind for retry purposes.
    pub fn class(self) -> ErrorClass {
        match self {
            Self::NoSpeechDetected | Self::NetworkError | Self::Unknown => ErrorClass::Recoverable,
            Self::AudioCaptureUnavailable | Self::PermissionDenied => ErrorClass::Blocking,
            Self::Aborted => ErrorClass::UserAbort,
        }
    }
}

impl std::fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified error last seen by a voice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    /// The recognizer reported an error.
    Capture {
        /// Recognizer error kind.
        error: CaptureErrorKind,
    },
    /// A transcript yielded no candidate code.
    NoCandidate,
    /// A confirmation answer was neither yes nor no.
    ConfirmationUnclear,
    /// The submission API rejected the code.
    SubmissionRejected {
        /// Reason given by the API.
        reason: String,
    },
    /// The submission API could not be reached.
    SubmissionUnavailable,
    /// The host has no speech recognizer.
    RecognitionUnsupported,
    /// A typed code did not match the expected format.
    InvalidTypedCode,
    /// Retries were exhausted.
    RetriesExhausted,
}

impl SessionError {
    /// Whether the UI should show a persistent notice with a manual retry action.
    pub fn needs_manual_retry(&self) -> bool {
        match self {
            Self::Capture { error } => error.class() == ErrorClass::Blocking,
            Self::RecognitionUnsupported | Self::RetriesExhausted => true,
            _ => false,
        }
    }
}

/// Options passed to a speech recognizer for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionOptions {
    /// Keep listening after the first result.
    pub continuous: bool,
    /// Emit partial results.
    pub interim_results: bool,
    /// BCP 47 language tag.
    pub language: String,
    /// Number of alternatives per result.
    pub max_alternatives: u32,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            continuous: false,
            interim_results: false,
            language: "en-US".to_string(),
            max_alternatives: 1,
        }
    }
}

/// Outcome reported by a code submission API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// The code was accepted.
    Accepted {
        /// Where the host should navigate next.
        redirect: Option<String>,
    },
    /// The code was understood but refused ("not found", "already joined").
    Rejected {
        /// Reason given by the API.
        reason: String,
    },
}

mod session;
pub mod speech;

pub use session::VoiceSession;
