//! Events consumed by the controller, and the reporters collaborators use to
//! emit them.
//!
//! Every collaborator callback is delivered as an [`Event`] on a single
//! unbounded queue. Each reporter carries the generation of the operation it
//! was issued for, so the controller can drop late events from an operation
//! it already cancelled or replaced.

use quizvoice_types::{CaptureErrorKind, MicPermission, SubmissionOutcome};
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Host requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartFlow,
    CancelFlow,
    SubmitTypedCode(String),
    RetryCapture,
    RepeatPrompt,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started,
    Result(String),
    Error(CaptureErrorKind),
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Permission(MicPermission),
    Level(f32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionEvent {
    Completed(SubmissionOutcome),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    Capture { generation: u64, event: CaptureEvent },
    Output { generation: u64, event: OutputEvent },
    Monitor { generation: u64, event: MonitorEvent },
    Submission { generation: u64, event: SubmissionEvent },
    /// A deadline armed for the operation with this generation has passed.
    Deadline { generation: u64 },
}

impl Event {
    /// Generation the event belongs to. Commands have none.
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Command(_) => None,
            Self::Capture { generation, .. }
            | Self::Output { generation, .. }
            | Self::Monitor { generation, .. }
            | Self::Submission { generation, .. }
            | Self::Deadline { generation } => Some(*generation),
        }
    }
}

/// Handed to a [`crate::SpeechRecognizer`] for one recognition attempt.
#[derive(Debug, Clone)]
pub struct CaptureReporter {
    tx: EventSender,
    generation: u64,
}

impl CaptureReporter {
    pub fn new(tx: EventSender, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started(&self) {
        self.send(CaptureEvent::Started);
    }

    pub fn result(&self, transcript: impl Into<String>) {
        self.send(CaptureEvent::Result(transcript.into()));
    }

    pub fn error(&self, kind: CaptureErrorKind) {
        self.send(CaptureEvent::Error(kind));
    }

    pub fn ended(&self) {
        self.send(CaptureEvent::Ended);
    }

    fn send(&self, event: CaptureEvent) {
        // The controller may already be gone; nothing to report to then.
        let _ = self.tx.send(Event::Capture {
            generation: self.generation,
            event,
        });
    }
}

/// Handed to a [`crate::SpeechSynthesizer`] for one utterance.
#[derive(Debug, Clone)]
pub struct OutputReporter {
    tx: EventSender,
    generation: u64,
}

impl OutputReporter {
    pub fn new(tx: EventSender, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn done(&self) {
        self.send(OutputEvent::Done);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(OutputEvent::Failed(reason.into()));
    }

    fn send(&self, event: OutputEvent) {
        let _ = self.tx.send(Event::Output {
            generation: self.generation,
            event,
        });
    }
}

/// Handed to the level monitor task for one capture attempt.
#[derive(Debug, Clone)]
pub struct LevelReporter {
    tx: EventSender,
    generation: u64,
}

impl LevelReporter {
    pub fn new(tx: EventSender, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn permission(&self, permission: MicPermission) {
        self.send(MonitorEvent::Permission(permission));
    }

    pub fn level(&self, level: f32) {
        self.send(MonitorEvent::Level(level));
    }

    /// Whether the controller side of the queue is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: MonitorEvent) {
        let _ = self.tx.send(Event::Monitor {
            generation: self.generation,
            event,
        });
    }
}

/// Handed to a [`crate::CodeSubmitter`] for one submission.
#[derive(Debug, Clone)]
pub struct SubmissionReporter {
    tx: EventSender,
    generation: u64,
}

impl SubmissionReporter {
    pub fn new(tx: EventSender, generation: u64) -> Self {
        Self { tx, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn completed(&self, outcome: SubmissionOutcome) {
        self.send(SubmissionEvent::Completed(outcome));
    }

    pub fn unavailable(&self, reason: impl Into<String>) {
        self.send(SubmissionEvent::Unavailable(reason.into()));
    }

    fn send(&self, event: SubmissionEvent) {
        let _ = self.tx.send(Event::Submission {
            generation: self.generation,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporters_tag_events_with_their_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let capture = CaptureReporter::new(tx.clone(), 7);
        let output = OutputReporter::new(tx, 8);

        capture.result("quiz one two");
        output.done();

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::Capture {
                generation: 7,
                event: CaptureEvent::Result("quiz one two".to_string()),
            }
        );
        let done = rx.try_recv().unwrap();
        assert_eq!(done.generation(), Some(8));
        assert!(matches!(
            done,
            Event::Output {
                event: OutputEvent::Done,
                ..
            }
        ));
    }

    #[test]
    fn reporting_after_receiver_drop_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let reporter = SubmissionReporter::new(tx, 1);
        reporter.unavailable("gone");
    }

    #[test]
    fn commands_have_no_generation() {
        assert_eq!(Event::Command(Command::StartFlow).generation(), None);
    }
}
