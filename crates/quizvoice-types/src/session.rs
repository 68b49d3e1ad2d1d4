//! The observable voice session snapshot.

use crate::{MicPermission, SessionError, VoiceStep};
use serde::{Deserialize, Serialize};

/// Snapshot of one voice join attempt.
///
/// Owned and mutated only by the controller; hosts receive copies through a
/// watch channel and render them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSession {
    /// Current dialog step.
    pub step: VoiceStep,
    /// Last transcript reported by the recognizer.
    pub raw_transcript: Option<String>,
    /// Normalized code extracted from a transcript, or typed by the user.
    pub candidate_code: Option<String>,
    /// Last transcript captured while waiting for confirmation.
    pub confirmation_transcript: Option<String>,
    /// Microphone access observed by the level monitor.
    pub mic_permission: MicPermission,
    /// Live input level in `[0, 1]`; zero whenever capture is inactive.
    pub audio_level: f32,
    /// Last classified error.
    pub last_error: Option<SessionError>,
    /// Failed attempts while listening for the code.
    pub code_retries: u32,
    /// Unclear or failed attempts while listening for confirmation.
    pub confirm_retries: u32,
    /// The recognizer is running.
    pub capture_active: bool,
    /// An utterance is being spoken.
    pub output_active: bool,
    /// Redirect target returned by a successful submission.
    pub redirect: Option<String>,
}

impl VoiceSession {
    /// Retry counter relevant to the current step.
    pub fn retry_count(&self) -> u32 {
        match self.step {
            VoiceStep::ListeningForConfirm | VoiceStep::AwaitingConfirmTts => self.confirm_retries,
            _ => self.code_retries,
        }
    }

    /// Whether the session ended, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(self.step, VoiceStep::Submitted | VoiceStep::Failed)
    }
}
