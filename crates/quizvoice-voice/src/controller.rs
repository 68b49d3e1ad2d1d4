//! The voice interaction controller.
//!
//! [`VoiceController`] is a reducer over [`Event`]s. It owns the session
//! snapshot and every speech resource, and it is the only place where
//! capture, output, metering and submission are started or stopped.
//! Collaborators never call back into it directly; they post generation
//! tagged events to its queue, and anything tagged with a generation the
//! controller no longer tracks is dropped. This keeps two rules true:
//!
//! - capture and output are never active at the same time;
//! - after a cancel, nothing from the cancelled operations changes state.
//!
//! [`VoiceController::spawn`] runs the reducer on a task and returns a
//! [`ControllerHandle`] for the host.

use crate::capture::{ProcessRecognizer, SpeechCapture, SpeechRecognizer};
use crate::config::{FlowConfig, VoiceConfig};
use crate::confirm::{classify_confirmation, Confirmation};
use crate::error::{CaptureStartError, VoiceError};
use crate::events::{
    CaptureEvent, CaptureReporter, Command, Event, EventReceiver, EventSender, LevelReporter,
    MonitorEvent, OutputEvent, OutputReporter, SubmissionEvent, SubmissionReporter,
};
use crate::extractor::extract_code;
use crate::monitor::{AudioLevelMonitor, MicrophoneProvider};
use crate::output::{
    FallbackOutcome, ProcessSynthesizer, RemoteSynthesizer, SpeechOutput, SpeechSynthesizer,
};
use crate::rules::{CodeRules, Phrases};
use crate::submit::{CodeSubmitter, HttpSubmitter};
use quizvoice_types::{
    CaptureErrorKind, ErrorClass, MicPermission, RecognitionOptions, SessionError,
    SubmissionOutcome, VoiceSession, VoiceStep,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Extra time allowed per character of an utterance before the output
/// watchdog gives up on it.
const SPEECH_TIME_PER_CHAR: Duration = Duration::from_millis(90);

/// The engines the controller drives.
pub struct Collaborators {
    /// `None` when the host cannot recognize speech at all.
    pub recognizer: Option<Box<dyn SpeechRecognizer>>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub fallback_synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    /// `None` disables level metering.
    pub microphone: Option<Arc<dyn MicrophoneProvider>>,
    pub submitter: Box<dyn CodeSubmitter>,
}

impl Collaborators {
    /// Builds the process and HTTP backends described by `config`.
    ///
    /// The speech server is the primary synthesizer when `tts.remote_url` is
    /// set, with the local command as fallback. No microphone provider is
    /// configured; hosts attach their own.
    pub fn from_config(config: &VoiceConfig, rules: &CodeRules) -> Result<Self, VoiceError> {
        let local = ProcessSynthesizer::from_command(&config.tts.local_command);

        let (synthesizer, fallback_synthesizer): (
            Box<dyn SpeechSynthesizer>,
            Option<Box<dyn SpeechSynthesizer>>,
        ) = if config.tts.remote_url.is_empty() {
            let local = local.ok_or_else(|| {
                VoiceError::Config(
                    "tts.local_command must not be empty without tts.remote_url".to_string(),
                )
            })?;
            (Box::new(local), None)
        } else {
            let remote = RemoteSynthesizer::new(
                &config.tts.remote_url,
                config.tts.player_command.clone(),
                config.flow.safety_timeout(),
            )?;
            (
                Box::new(remote),
                local.map(|l| Box::new(l) as Box<dyn SpeechSynthesizer>),
            )
        };

        let recognizer = ProcessRecognizer::from_command(&config.recognition.command)
            .map(|r| Box::new(r) as Box<dyn SpeechRecognizer>);

        let submitter = HttpSubmitter::new(
            &config.submission.url,
            rules.submit_field.clone(),
            config.flow.safety_timeout(),
        )?;

        Ok(Self {
            recognizer,
            synthesizer,
            fallback_synthesizer,
            microphone: None,
            submitter: Box::new(submitter),
        })
    }
}

/// What happens once the current output turn has been spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    Nothing,
    Listen(VoiceStep),
    Submit,
}

struct Turn {
    queue: VecDeque<String>,
    then: FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    CaptureStart,
    Listening,
    Output,
    Submission,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    kind: DeadlineKind,
    generation: u64,
    at: Instant,
}

/// Spoken explanation for a recognizer error.
pub fn capture_error_message(kind: CaptureErrorKind) -> &'static str {
    match kind {
        CaptureErrorKind::NoSpeechDetected => "No speech detected. Please try again.",
        CaptureErrorKind::AudioCaptureUnavailable => {
            "No microphone found. Please check your microphone connection."
        }
        CaptureErrorKind::PermissionDenied => {
            "Microphone access denied. Please allow microphone access in your settings."
        }
        CaptureErrorKind::NetworkError => "Network error. Please check your internet connection.",
        CaptureErrorKind::Aborted | CaptureErrorKind::Unknown => {
            "Error recognizing speech. Please try again."
        }
    }
}

pub struct VoiceController {
    session: VoiceSession,
    rules: CodeRules,
    flow: FlowConfig,
    capture: SpeechCapture,
    output: SpeechOutput,
    monitor: AudioLevelMonitor,
    submitter: Box<dyn CodeSubmitter>,
    level_generation: Option<u64>,
    submission: Option<u64>,
    turn: Option<Turn>,
    deadline: Option<Deadline>,
    generation: u64,
    events: EventSender,
    snapshots: watch::Sender<VoiceSession>,
    disposed: bool,
}

impl VoiceController {
    /// Creates a controller and the receiving end of its event queue.
    pub fn new(
        flow: FlowConfig,
        options: RecognitionOptions,
        rules: CodeRules,
        collaborators: Collaborators,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(VoiceSession::default());
        let monitor = AudioLevelMonitor::new(
            collaborators.microphone,
            flow.level_frame(),
            flow.safety_timeout(),
        );
        let controller = Self {
            session: VoiceSession::default(),
            rules,
            capture: SpeechCapture::new(collaborators.recognizer, options),
            output: SpeechOutput::new(
                collaborators.synthesizer,
                collaborators.fallback_synthesizer,
            ),
            monitor,
            submitter: collaborators.submitter,
            flow,
            level_generation: None,
            submission: None,
            turn: None,
            deadline: None,
            generation: 0,
            events,
            snapshots,
            disposed: false,
        };
        (controller, receiver)
    }

    /// Creates a controller from loaded configuration.
    pub fn from_config(
        config: &VoiceConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, EventReceiver), VoiceError> {
        let rules = CodeRules::from_config(&config.rules)?;
        Ok(Self::new(
            config.flow.clone(),
            config.recognition.options(),
            rules,
            collaborators,
        ))
    }

    pub fn session(&self) -> &VoiceSession {
        &self.session
    }

    pub fn rules(&self) -> &CodeRules {
        &self.rules
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceSession> {
        self.snapshots.subscribe()
    }

    /// A sender into the controller's own event queue.
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Generation of the operation whose deadline is armed, if any.
    pub fn pending_deadline(&self) -> Option<u64> {
        self.deadline.map(|d| d.generation)
    }

    /// Applies one event.
    pub fn handle(&mut self, event: Event) {
        if self.disposed {
            debug!(?event, "controller disposed; event dropped");
            return;
        }
        match event {
            Event::Command(command) => self.on_command(command),
            Event::Capture { generation, event } => self.on_capture(generation, event),
            Event::Output { generation, event } => self.on_output(generation, event),
            Event::Monitor { generation, event } => self.on_monitor(generation, event),
            Event::Submission { generation, event } => self.on_submission(generation, event),
            Event::Deadline { generation } => self.on_deadline(generation),
        }
        self.publish();
    }

    /// Runs the controller on its own task.
    pub fn spawn(self, events: EventReceiver) -> (ControllerHandle, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handle = ControllerHandle {
            commands,
            snapshots: self.subscribe(),
        };
        let task = tokio::spawn(self.run(events, command_rx));
        (handle, task)
    }

    /// Processes commands, collaborator events and deadlines until shutdown
    /// or until every [`ControllerHandle`] is dropped.
    pub async fn run(
        mut self,
        mut events: EventReceiver,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        info!(rules = self.rules.name, "voice controller running");
        while !self.disposed {
            let event = tokio::select! {
                command = commands.recv() => Event::Command(command.unwrap_or(Command::Shutdown)),
                Some(event) = events.recv() => event,
                generation = expire(self.deadline) => Event::Deadline { generation },
            };
            self.handle(event);
        }
        info!("voice controller stopped");
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn publish(&self) {
        self.snapshots.send_if_modified(|current| {
            if *current == self.session {
                false
            } else {
                *current = self.session.clone();
                true
            }
        });
    }

    fn set_step(&mut self, step: VoiceStep) {
        if self.session.step != step {
            info!(from = %self.session.step, to = %step, "voice step");
            self.session.step = step;
        }
    }

    fn arm(&mut self, kind: DeadlineKind, generation: u64, after: Duration) {
        self.deadline = Some(Deadline {
            kind,
            generation,
            at: Instant::now() + after,
        });
    }

    fn disarm(&mut self, generation: u64) {
        if self.deadline.is_some_and(|d| d.generation == generation) {
            self.deadline = None;
        }
    }

    // -- commands ----------------------------------------------------------

    fn on_command(&mut self, command: Command) {
        match command {
            Command::StartFlow => self.start_flow(),
            Command::CancelFlow => self.cancel_flow(),
            Command::SubmitTypedCode(code) => self.submit_typed_code(&code),
            Command::RetryCapture => self.retry_capture(),
            Command::RepeatPrompt => self.repeat_prompt(),
            Command::Shutdown => {
                self.release();
                self.disposed = true;
                info!("voice controller disposed");
            }
        }
    }

    fn start_flow(&mut self) {
        let step = self.session.step;
        if !matches!(
            step,
            VoiceStep::Idle | VoiceStep::Failed | VoiceStep::Submitted
        ) {
            debug!(%step, "flow already running; start ignored");
            return;
        }

        self.reset_session();
        if !self.capture.is_supported() {
            self.unsupported();
            return;
        }

        info!(rules = self.rules.name, "voice flow started");
        self.set_step(VoiceStep::Greeting);
        let intro = self.rules.phrases.intro.clone();
        self.say(vec![intro], FollowUp::Listen(VoiceStep::ListeningForCode));
    }

    fn cancel_flow(&mut self) {
        let step = self.session.step;
        self.reset_session();
        if step != VoiceStep::Idle {
            info!(from = %step, "voice flow cancelled");
        }
    }

    fn submit_typed_code(&mut self, code: &str) {
        let step = self.session.step;
        if step.is_committed() {
            debug!(%step, "code already committed; typed code ignored");
            return;
        }

        let normalized = self.rules.normalize_typed(code);
        if !self.rules.is_valid_typed(&normalized) {
            info!(code = %normalized, "typed code has an invalid format");
            self.session.last_error = Some(SessionError::InvalidTypedCode);
            if !self.capture.is_active() && !self.output.is_active() {
                let message = self.rules.phrases.invalid_typed.clone();
                self.say(vec![message], FollowUp::Nothing);
            }
            return;
        }

        self.release();
        self.session.raw_transcript = None;
        self.session.confirmation_transcript = None;
        self.accept(normalized);
    }

    fn retry_capture(&mut self) {
        let step = self.session.step;
        if !step.is_listening() || self.capture.is_active() {
            debug!(%step, "nothing to retry");
            return;
        }
        if matches!(
            self.session.last_error,
            Some(SessionError::Capture { error }) if error.class() == ErrorClass::Blocking
        ) {
            self.session.last_error = None;
        }
        info!(%step, "manual capture retry");
        self.start_capture();
    }

    fn repeat_prompt(&mut self) {
        if self.output.is_active() {
            debug!("already speaking; repeat ignored");
            return;
        }
        let step = self.session.step;
        if step.is_committed() {
            debug!(%step, "code already committed; repeat ignored");
            return;
        }
        let phrases = &self.rules.phrases;
        let line = match &self.session.candidate_code {
            Some(code) => {
                let hint = if step == VoiceStep::ListeningForConfirm {
                    &phrases.confirm_hint
                } else {
                    &phrases.edit_hint
                };
                format!(
                    "{} {}",
                    Phrases::render(&phrases.current_code, Some(code), None),
                    hint
                )
            }
            None if step == VoiceStep::Idle => phrases.ready.clone(),
            None => phrases.intro.clone(),
        };
        let then = if step.is_listening() {
            FollowUp::Listen(step)
        } else {
            FollowUp::Nothing
        };
        self.say(vec![line], then);
    }

    // -- capture -----------------------------------------------------------

    fn start_capture(&mut self) {
        let step = self.session.step;
        if self.output.is_active() {
            // Capture waits for the current output turn.
            match self.turn.as_mut() {
                Some(turn) => turn.then = FollowUp::Listen(step),
                None => {
                    self.turn = Some(Turn {
                        queue: VecDeque::new(),
                        then: FollowUp::Listen(step),
                    })
                }
            }
            return;
        }
        if self.capture.is_active() {
            debug!("capture already running");
            return;
        }

        let generation = self.next_generation();
        match self
            .capture
            .start(CaptureReporter::new(self.events.clone(), generation))
        {
            Ok(()) => {
                self.session.capture_active = true;
                self.arm(
                    DeadlineKind::CaptureStart,
                    generation,
                    self.flow.safety_timeout(),
                );
            }
            Err(CaptureStartError::Unsupported) => self.unsupported(),
            Err(CaptureStartError::AlreadyRunning(active)) => {
                warn!(active, "recognizer already running");
            }
            Err(CaptureStartError::Platform(reason)) => {
                warn!(%reason, "recognizer failed to start");
                self.session.last_error = Some(SessionError::Capture {
                    error: CaptureErrorKind::Unknown,
                });
                self.retry_listening(capture_error_message(CaptureErrorKind::Unknown).to_string());
            }
        }
    }

    /// Stops capture and metering. Idempotent.
    fn end_capture(&mut self) {
        self.capture.stop();
        self.monitor.stop();
        self.level_generation = None;
        self.session.capture_active = false;
        self.session.audio_level = 0.0;
        if self.deadline.is_some_and(|d| {
            matches!(d.kind, DeadlineKind::CaptureStart | DeadlineKind::Listening)
        }) {
            self.deadline = None;
        }
    }

    fn on_capture(&mut self, generation: u64, event: CaptureEvent) {
        if self.capture.generation() != Some(generation) {
            debug!(generation, ?event, "stale capture event discarded");
            return;
        }
        match event {
            CaptureEvent::Started => {
                self.arm(
                    DeadlineKind::Listening,
                    generation,
                    self.flow.listen_timeout(),
                );
                let level_generation = self.next_generation();
                self.level_generation = Some(level_generation);
                self.monitor
                    .start(LevelReporter::new(self.events.clone(), level_generation));
            }
            CaptureEvent::Result(transcript) => {
                self.end_capture();
                self.on_transcript(transcript);
            }
            CaptureEvent::Error(kind) => {
                self.end_capture();
                self.on_capture_error(kind);
            }
            CaptureEvent::Ended => {
                debug!(generation, "capture ended without an outcome");
                self.end_capture();
                self.on_capture_error(CaptureErrorKind::NoSpeechDetected);
            }
        }
    }

    fn on_transcript(&mut self, transcript: String) {
        let transcript = transcript.trim().to_lowercase();
        match self.session.step {
            VoiceStep::ListeningForCode => {
                debug!(%transcript, "code transcript");
                self.session.raw_transcript = Some(transcript.clone());
                match extract_code(&transcript, &self.rules) {
                    Some(code) => {
                        info!(%code, "candidate code recognized");
                        self.session.candidate_code = Some(code.clone());
                        self.session.last_error = None;
                        // Retries bound consecutive misses only.
                        self.session.code_retries = 0;
                        self.session.confirm_retries = 0;
                        self.session.confirmation_transcript = None;
                        self.set_step(VoiceStep::AwaitingConfirmTts);
                        let phrases = &self.rules.phrases;
                        let lines = vec![
                            Phrases::render(&phrases.recognized, Some(&code), None),
                            phrases.confirm_question.clone(),
                        ];
                        self.say(lines, FollowUp::Listen(VoiceStep::ListeningForConfirm));
                    }
                    None => {
                        self.session.last_error = Some(SessionError::NoCandidate);
                        let message = self.rules.phrases.no_candidate.clone();
                        self.retry_listening(message);
                    }
                }
            }
            VoiceStep::ListeningForConfirm => {
                debug!(%transcript, "confirmation transcript");
                self.session.confirmation_transcript = Some(transcript.clone());
                match classify_confirmation(&transcript, &self.rules) {
                    Confirmation::Negative => {
                        info!("candidate code rejected by the user");
                        self.session.candidate_code = None;
                        self.session.raw_transcript = None;
                        self.session.last_error = None;
                        self.session.confirm_retries = 0;
                        self.set_step(VoiceStep::ListeningForCode);
                        let message = self.rules.phrases.retry_after_negative.clone();
                        self.say(
                            vec![message],
                            FollowUp::Listen(VoiceStep::ListeningForCode),
                        );
                    }
                    Confirmation::Affirmative => match self.session.candidate_code.clone() {
                        Some(code) => self.accept(code),
                        None => {
                            warn!("confirmation without a candidate code");
                            self.set_step(VoiceStep::ListeningForCode);
                            let message = self.rules.phrases.no_candidate.clone();
                            self.say(
                                vec![message],
                                FollowUp::Listen(VoiceStep::ListeningForCode),
                            );
                        }
                    },
                    Confirmation::Unclear => {
                        self.session.last_error = Some(SessionError::ConfirmationUnclear);
                        let message = self.rules.phrases.unclear_confirmation.clone();
                        self.retry_listening(message);
                    }
                }
            }
            step => debug!(%step, "transcript outside a listening step ignored"),
        }
    }

    fn on_capture_error(&mut self, kind: CaptureErrorKind) {
        let message = capture_error_message(kind).to_string();
        match kind.class() {
            ErrorClass::UserAbort => debug!("capture aborted"),
            ErrorClass::Blocking => {
                warn!(%kind, "capture blocked; waiting for a manual retry");
                self.session.last_error = Some(SessionError::Capture { error: kind });
                self.session.mic_permission = if kind == CaptureErrorKind::PermissionDenied {
                    MicPermission::Denied
                } else {
                    MicPermission::Unavailable
                };
                self.say(vec![message], FollowUp::Nothing);
            }
            ErrorClass::Recoverable => {
                info!(%kind, "recoverable capture error");
                self.session.last_error = Some(SessionError::Capture { error: kind });
                if self.session.step.is_listening() {
                    self.retry_listening(message);
                }
            }
        }
    }

    /// Counts a failed attempt in the current listening step, then either
    /// explains and listens again or gives up.
    fn retry_listening(&mut self, message: String) {
        let step = self.session.step;
        let (count, max) = if step == VoiceStep::ListeningForConfirm {
            self.session.confirm_retries += 1;
            (self.session.confirm_retries, self.flow.max_confirm_retries)
        } else {
            self.session.code_retries += 1;
            (self.session.code_retries, self.flow.max_retries)
        };

        if count >= max {
            error!(%step, count, "retries exhausted");
            self.fail(SessionError::RetriesExhausted);
        } else {
            info!(%step, attempt = count, max, "listening again");
            self.say(vec![message], FollowUp::Listen(step));
        }
    }

    fn accept(&mut self, code: String) {
        info!(%code, "code accepted");
        let line = Phrases::render(&self.rules.phrases.accepted, Some(&code), None);
        self.session.candidate_code = Some(code);
        self.session.last_error = None;
        self.set_step(VoiceStep::Accepted);
        self.say(vec![line], FollowUp::Submit);
    }

    fn unsupported(&mut self) {
        warn!("no speech recognizer available");
        self.release();
        self.session.last_error = Some(SessionError::RecognitionUnsupported);
        self.set_step(VoiceStep::Failed);
        let message = self.rules.phrases.unsupported.clone();
        self.say(vec![message], FollowUp::Nothing);
    }

    fn fail(&mut self, error: SessionError) {
        self.release();
        self.session.last_error = Some(error);
        self.set_step(VoiceStep::Failed);
        let message = self.rules.phrases.failed.clone();
        self.say(vec![message], FollowUp::Nothing);
    }

    // -- output ------------------------------------------------------------

    /// Speaks `lines` in order, then runs `then`. Replaces any turn in
    /// progress.
    fn say(&mut self, lines: Vec<String>, then: FollowUp) {
        self.end_capture();
        let mut queue: VecDeque<String> = lines.into();
        match queue.pop_front() {
            Some(first) => {
                self.turn = Some(Turn { queue, then });
                self.speak_line(first);
            }
            None => {
                self.turn = None;
                self.run_follow_up(then);
            }
        }
    }

    fn speak_line(&mut self, text: String) {
        let generation = self.next_generation();
        let reporter = OutputReporter::new(self.events.clone(), generation);
        match self.output.speak(&text, reporter) {
            Ok(()) => {
                self.session.output_active = true;
                let budget = self.flow.safety_timeout()
                    + SPEECH_TIME_PER_CHAR * text.chars().count() as u32;
                self.arm(DeadlineKind::Output, generation, budget);
            }
            Err(e) => {
                warn!("speech output unavailable, continuing silently: {}", e);
                self.session.output_active = false;
                self.advance_turn();
            }
        }
    }

    fn on_output(&mut self, generation: u64, event: OutputEvent) {
        if self.output.generation() != Some(generation) {
            debug!(generation, ?event, "stale output event discarded");
            return;
        }
        match event {
            OutputEvent::Done => {
                self.output.finish(generation);
                self.output_finished(generation);
            }
            OutputEvent::Failed(reason) => match self.output.on_failed(generation, &reason) {
                FallbackOutcome::Retried => info!(generation, "utterance moved to fallback engine"),
                FallbackOutcome::Exhausted => {
                    warn!(generation, %reason, "utterance could not be spoken; continuing");
                    self.output_finished(generation);
                }
            },
        }
    }

    fn output_finished(&mut self, generation: u64) {
        self.session.output_active = false;
        self.disarm(generation);
        self.advance_turn();
    }

    fn advance_turn(&mut self) {
        let next = match self.turn.as_mut() {
            Some(turn) => turn.queue.pop_front(),
            None => return,
        };
        if let Some(line) = next {
            self.speak_line(line);
        } else if let Some(turn) = self.turn.take() {
            self.run_follow_up(turn.then);
        }
    }

    fn run_follow_up(&mut self, then: FollowUp) {
        match then {
            FollowUp::Nothing => {}
            FollowUp::Listen(step) => {
                self.set_step(step);
                self.start_capture();
            }
            FollowUp::Submit => self.submit(),
        }
    }

    // -- metering ----------------------------------------------------------

    fn on_monitor(&mut self, generation: u64, event: MonitorEvent) {
        if self.level_generation != Some(generation) {
            debug!(generation, "stale level event discarded");
            return;
        }
        match event {
            MonitorEvent::Permission(permission) => {
                if self.session.mic_permission != permission {
                    info!(?permission, "microphone permission");
                    self.session.mic_permission = permission;
                }
            }
            MonitorEvent::Level(level) => {
                if self.session.capture_active {
                    self.session.audio_level = level.clamp(0.0, 1.0);
                }
            }
        }
    }

    // -- submission --------------------------------------------------------

    fn submit(&mut self) {
        let Some(code) = self.session.candidate_code.clone() else {
            warn!("nothing to submit");
            self.set_step(VoiceStep::ListeningForCode);
            let message = self.rules.phrases.no_candidate.clone();
            self.say(
                vec![message],
                FollowUp::Listen(VoiceStep::ListeningForCode),
            );
            return;
        };

        self.set_step(VoiceStep::Submitting);
        let generation = self.next_generation();
        self.submission = Some(generation);
        info!(%code, generation, "submitting code");
        self.submitter
            .submit(&code, SubmissionReporter::new(self.events.clone(), generation));
        self.arm(
            DeadlineKind::Submission,
            generation,
            self.flow.safety_timeout(),
        );
    }

    fn on_submission(&mut self, generation: u64, event: SubmissionEvent) {
        if self.submission != Some(generation) {
            debug!(generation, ?event, "stale submission event discarded");
            return;
        }
        self.submission = None;
        self.disarm(generation);

        match event {
            SubmissionEvent::Completed(SubmissionOutcome::Accepted { redirect }) => {
                info!(?redirect, "code submitted");
                self.release();
                self.session.redirect = redirect;
                self.session.last_error = None;
                self.set_step(VoiceStep::Submitted);
            }
            SubmissionEvent::Completed(SubmissionOutcome::Rejected { reason }) => {
                info!(%reason, "code rejected by the submission API");
                let message = Phrases::render(&self.rules.phrases.rejected, None, Some(&reason));
                self.session.last_error = Some(SessionError::SubmissionRejected { reason });
                self.resume_after_submission(message);
            }
            SubmissionEvent::Unavailable(reason) => self.submission_unavailable(&reason),
        }
    }

    fn submission_unavailable(&mut self, reason: &str) {
        warn!(reason, "submission API unreachable");
        self.session.last_error = Some(SessionError::SubmissionUnavailable);
        let message = self.rules.phrases.unavailable.clone();
        self.resume_after_submission(message);
    }

    fn resume_after_submission(&mut self, message: String) {
        self.session.candidate_code = None;
        self.session.raw_transcript = None;
        self.session.confirmation_transcript = None;
        self.set_step(VoiceStep::ListeningForCode);
        self.retry_listening(message);
    }

    // -- deadlines -----------------------------------------------------------

    fn on_deadline(&mut self, generation: u64) {
        let kind = match self.deadline {
            Some(deadline) if deadline.generation == generation => deadline.kind,
            _ => {
                debug!(generation, "stale deadline discarded");
                return;
            }
        };
        self.deadline = None;

        match kind {
            DeadlineKind::CaptureStart => {
                warn!(generation, "recognizer never started");
                self.end_capture();
                self.on_capture_error(CaptureErrorKind::Unknown);
            }
            DeadlineKind::Listening => {
                info!(generation, "listening timed out");
                self.end_capture();
                self.on_capture_error(CaptureErrorKind::NoSpeechDetected);
            }
            DeadlineKind::Output => {
                warn!(generation, "utterance never completed; moving on");
                self.output.cancel();
                self.output_finished(generation);
            }
            DeadlineKind::Submission => {
                self.submitter.cancel();
                self.submission = None;
                self.submission_unavailable("no answer before the safety timeout");
            }
        }
    }

    // -- lifecycle -----------------------------------------------------------

    /// Stops every resource and forgets every outstanding generation.
    fn release(&mut self) {
        self.end_capture();
        self.output.cancel();
        if self.submission.take().is_some() {
            self.submitter.cancel();
        }
        self.turn = None;
        self.deadline = None;
        self.session.output_active = false;
    }

    fn reset_session(&mut self) {
        self.release();
        self.session = VoiceSession {
            mic_permission: self.session.mic_permission,
            ..VoiceSession::default()
        };
    }
}

async fn expire(deadline: Option<Deadline>) -> u64 {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(deadline.at).await;
            deadline.generation
        }
        None => std::future::pending().await,
    }
}

/// Host-side handle to a spawned controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<VoiceSession>,
}

impl ControllerHandle {
    pub fn start_flow(&self) -> Result<(), VoiceError> {
        self.send(Command::StartFlow)
    }

    pub fn cancel_flow(&self) -> Result<(), VoiceError> {
        self.send(Command::CancelFlow)
    }

    pub fn submit_typed_code(&self, code: impl Into<String>) -> Result<(), VoiceError> {
        self.send(Command::SubmitTypedCode(code.into()))
    }

    pub fn retry_capture(&self) -> Result<(), VoiceError> {
        self.send(Command::RetryCapture)
    }

    pub fn repeat_prompt(&self) -> Result<(), VoiceError> {
        self.send(Command::RepeatPrompt)
    }

    pub fn shutdown(&self) -> Result<(), VoiceError> {
        self.send(Command::Shutdown)
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> VoiceSession {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceSession> {
        self.snapshots.clone()
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&VoiceSession) -> bool,
    ) -> Result<VoiceSession, VoiceError> {
        let mut snapshots = self.snapshots.clone();
        let session = snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| VoiceError::ControllerClosed)?;
        Ok(session.clone())
    }

    fn send(&self, command: Command) -> Result<(), VoiceError> {
        self.commands
            .send(command)
            .map_err(|_| VoiceError::ControllerClosed)
    }
}
