//! Voice-driven code acquisition for the QuizVoice platform.
//!
//! A participant joining a quiz (or identifying themselves) is greeted, asked
//! to speak a short code, hears it read back, confirms it by voice, and the
//! confirmed code is handed to the platform's join API. Typing the code is
//! always available as a bypass.
//!
//! The [`VoiceController`] drives the dialog. It owns one recognizer
//! ([`SpeechCapture`]), one synthesizer pair ([`SpeechOutput`]), an
//! [`AudioLevelMonitor`] for the live input meter, and a [`CodeSubmitter`].
//! Every engine sits behind a trait so hosts can plug in platform engines;
//! process and HTTP backends are provided for headless hosts.

pub mod capture;
pub mod config;
pub mod confirm;
pub mod controller;
pub mod error;
pub mod events;
pub mod extractor;
pub mod monitor;
pub mod output;
pub mod rules;
pub mod submit;

pub use capture::{ProcessRecognizer, SpeechCapture, SpeechRecognizer};
pub use config::{load_config, ConfigError, FlowConfig, VoiceConfig};
pub use confirm::{classify_confirmation, Confirmation};
pub use controller::{Collaborators, ControllerHandle, VoiceController};
pub use error::{CaptureStartError, MicrophoneError, SubmitError, VoiceError};
pub use events::{
    CaptureReporter, Command, Event, LevelReporter, OutputReporter, SubmissionReporter,
};
pub use extractor::{extract_code, normalize_transcript, spell_code};
pub use monitor::{AudioLevelMonitor, MicrophoneProvider, MicrophoneStream, WavMicrophone};
pub use output::{ProcessSynthesizer, RemoteSynthesizer, SpeechOutput, SpeechSynthesizer};
pub use rules::{CodeRules, Phrases, RulePreset, RulesConfig};
pub use submit::{CodeSubmitter, HttpSubmitter};
