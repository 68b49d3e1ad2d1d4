#![allow(dead_code)]

use quizvoice_types::{CaptureErrorKind, RecognitionOptions, SubmissionOutcome, VoiceSession};
use quizvoice_voice::events::EventReceiver;
use quizvoice_voice::{
    CaptureReporter, CaptureStartError, CodeRules, CodeSubmitter, Collaborators, Command, Event,
    FlowConfig, OutputReporter, SpeechRecognizer, SpeechSynthesizer, SubmissionReporter,
    VoiceController, VoiceError,
};
use std::sync::{Arc, Mutex};

/// Everything the fakes were asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CaptureStart(u64),
    CaptureStop,
    Speak(u64, String),
    SpeakCancel,
    Submit(u64, String),
    SubmitCancel,
}

#[derive(Default)]
pub struct Log {
    pub calls: Vec<Call>,
    pub capture: Vec<CaptureReporter>,
    pub output: Vec<OutputReporter>,
    pub submission: Vec<SubmissionReporter>,
    /// Capture is running according to the fakes themselves.
    pub capturing: bool,
    /// Output is running according to the fakes themselves.
    pub speaking: bool,
    /// Set when capture and output were ever running together.
    pub overlap: bool,
}

impl Log {
    pub fn capture_starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::CaptureStart(_)))
            .count()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Speak(_, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(_, code) => Some(code.clone()),
                _ => None,
            })
            .collect()
    }
}

pub type SharedLog = Arc<Mutex<Log>>;

pub struct FakeRecognizer(pub SharedLog);

impl SpeechRecognizer for FakeRecognizer {
    fn start(
        &mut self,
        _options: &RecognitionOptions,
        reporter: CaptureReporter,
    ) -> Result<(), CaptureStartError> {
        let mut log = self.0.lock().unwrap();
        log.calls.push(Call::CaptureStart(reporter.generation()));
        log.capture.push(reporter);
        log.capturing = true;
        if log.speaking {
            log.overlap = true;
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.calls.push(Call::CaptureStop);
        log.capturing = false;
    }
}

pub struct FakeSynthesizer(pub SharedLog);

impl SpeechSynthesizer for FakeSynthesizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn speak(&mut self, text: &str, reporter: OutputReporter) -> Result<(), VoiceError> {
        let mut log = self.0.lock().unwrap();
        log.calls
            .push(Call::Speak(reporter.generation(), text.to_string()));
        log.output.push(reporter);
        log.speaking = true;
        if log.capturing {
            log.overlap = true;
        }
        Ok(())
    }

    fn cancel(&mut self) {
        let mut log = self.0.lock().unwrap();
        log.calls.push(Call::SpeakCancel);
        log.speaking = false;
    }
}

pub struct FakeSubmitter(pub SharedLog);

impl CodeSubmitter for FakeSubmitter {
    fn submit(&mut self, code: &str, reporter: SubmissionReporter) {
        let mut log = self.0.lock().unwrap();
        log.calls
            .push(Call::Submit(reporter.generation(), code.to_string()));
        log.submission.push(reporter);
    }

    fn cancel(&mut self) {
        self.0.lock().unwrap().calls.push(Call::SubmitCancel);
    }
}

/// Drives a controller synchronously against the fakes.
pub struct Harness {
    pub controller: VoiceController,
    pub events: EventReceiver,
    pub log: SharedLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FlowConfig::default(), CodeRules::join_code(), true)
    }

    pub fn with(flow: FlowConfig, rules: CodeRules, recognizer: bool) -> Self {
        let log = SharedLog::default();
        let collaborators = Collaborators {
            recognizer: recognizer
                .then(|| Box::new(FakeRecognizer(log.clone())) as Box<dyn SpeechRecognizer>),
            synthesizer: Box::new(FakeSynthesizer(log.clone())),
            fallback_synthesizer: None,
            microphone: None,
            submitter: Box::new(FakeSubmitter(log.clone())),
        };
        let (controller, events) = VoiceController::new(
            flow,
            RecognitionOptions::default(),
            rules,
            collaborators,
        );
        Self {
            controller,
            events,
            log,
        }
    }

    pub fn session(&self) -> &VoiceSession {
        self.controller.session()
    }

    pub fn send(&mut self, command: Command) {
        self.controller.handle(Event::Command(command));
        self.pump();
    }

    /// Feeds queued collaborator events to the controller.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.controller.handle(event);
        }
    }

    pub fn last_capture(&self) -> CaptureReporter {
        self.log
            .lock()
            .unwrap()
            .capture
            .last()
            .cloned()
            .expect("capture was started")
    }

    pub fn last_output(&self) -> OutputReporter {
        self.log
            .lock()
            .unwrap()
            .output
            .last()
            .cloned()
            .expect("something was spoken")
    }

    pub fn last_submission(&self) -> SubmissionReporter {
        self.log
            .lock()
            .unwrap()
            .submission
            .last()
            .cloned()
            .expect("a code was submitted")
    }

    /// Completes the most recent utterance.
    pub fn finish_utterance(&mut self) {
        self.log.lock().unwrap().speaking = false;
        self.last_output().done();
        self.pump();
    }

    /// Completes utterances until the controller stops speaking.
    pub fn finish_speaking(&mut self) {
        for _ in 0..16 {
            if !self.session().output_active {
                return;
            }
            self.finish_utterance();
        }
        panic!("controller kept speaking");
    }

    /// The running recognizer hears `transcript`.
    pub fn hear(&mut self, transcript: &str) {
        let reporter = self.last_capture();
        reporter.started();
        reporter.result(transcript);
        reporter.ended();
        self.log.lock().unwrap().capturing = false;
        self.pump();
    }

    /// The running recognizer fails with `kind`.
    pub fn capture_error(&mut self, kind: CaptureErrorKind) {
        let reporter = self.last_capture();
        reporter.started();
        reporter.error(kind);
        reporter.ended();
        self.log.lock().unwrap().capturing = false;
        self.pump();
    }

    pub fn answer(&mut self, outcome: SubmissionOutcome) {
        self.last_submission().completed(outcome);
        self.pump();
    }

    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().capture_starts()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.log.lock().unwrap().spoken()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.log.lock().unwrap().submitted()
    }

    pub fn overlapped(&self) -> bool {
        self.log.lock().unwrap().overlap
    }
}

/// A flow config with the given retry cap.
pub fn flow(max_retries: u32) -> FlowConfig {
    FlowConfig {
        max_retries,
        max_confirm_retries: max_retries,
        ..FlowConfig::default()
    }
}
