//! Speech capture: the recognizer seam, the single-attempt wrapper around it,
//! and a recognizer backed by an external process.

use crate::error::CaptureStartError;
use crate::events::CaptureReporter;
use quizvoice_types::{CaptureErrorKind, RecognitionOptions};
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A platform speech recognizer.
///
/// `start` begins one attempt and reports its lifecycle through the
/// reporter: `started`, then at most one of `result` or `error`, then
/// `ended`. `stop` cancels the running attempt; a stopped attempt may still
/// report `error(Aborted)` and `ended`.
pub trait SpeechRecognizer: Send {
    fn start(
        &mut self,
        options: &RecognitionOptions,
        reporter: CaptureReporter,
    ) -> Result<(), CaptureStartError>;

    fn stop(&mut self);
}

/// Wraps the host recognizer and enforces a single running attempt.
pub struct SpeechCapture {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    options: RecognitionOptions,
    active: Option<u64>,
}

impl SpeechCapture {
    /// `None` means the host has no recognizer at all.
    pub fn new(recognizer: Option<Box<dyn SpeechRecognizer>>, options: RecognitionOptions) -> Self {
        Self {
            recognizer,
            options,
            active: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Generation of the running attempt.
    pub fn generation(&self) -> Option<u64> {
        self.active
    }

    pub fn start(&mut self, reporter: CaptureReporter) -> Result<(), CaptureStartError> {
        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or(CaptureStartError::Unsupported)?;
        if let Some(generation) = self.active {
            return Err(CaptureStartError::AlreadyRunning(generation));
        }
        let generation = reporter.generation();
        recognizer.start(&self.options, reporter)?;
        self.active = Some(generation);
        debug!(generation, "capture started");
        Ok(())
    }

    /// Stops the running attempt. Idempotent.
    pub fn stop(&mut self) {
        if let Some(generation) = self.active.take() {
            if let Some(recognizer) = self.recognizer.as_mut() {
                recognizer.stop();
            }
            debug!(generation, "capture stopped");
        }
    }
}

/// Recognizes speech by running an external command per attempt.
///
/// The command records from the microphone and prints the transcript to
/// stdout. An empty transcript is reported as
/// [`CaptureErrorKind::NoSpeechDetected`], and a command that cannot be
/// spawned as [`CaptureErrorKind::AudioCaptureUnavailable`]. On a non-zero
/// exit, the last line of stderr is read as a platform error code
/// (`no-speech`, `not-allowed`, `audio-capture`, `network`); anything else
/// is [`CaptureErrorKind::Unknown`].
///
/// `{language}` in any argument is replaced with the attempt's language tag.
pub struct ProcessRecognizer {
    program: String,
    args: Vec<String>,
    running: Option<(JoinHandle<()>, CaptureReporter)>,
}

impl ProcessRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            running: None,
        }
    }

    /// Builds a recognizer from a command line; `None` when it is empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl SpeechRecognizer for ProcessRecognizer {
    fn start(
        &mut self,
        options: &RecognitionOptions,
        reporter: CaptureReporter,
    ) -> Result<(), CaptureStartError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| CaptureStartError::Platform("no async runtime".to_string()))?;

        let mut command = Command::new(&self.program);
        command
            .args(
                self.args
                    .iter()
                    .map(|arg| arg.replace("{language}", &options.language)),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawned = {
            let _guard = runtime.enter();
            command.spawn()
        };
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn recognizer {}: {}", self.program, e);
                reporter.error(CaptureErrorKind::AudioCaptureUnavailable);
                reporter.ended();
                return Ok(());
            }
        };

        let task_reporter = reporter.clone();
        let task = runtime.spawn(async move {
            task_reporter.started();
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if text.is_empty() {
                        task_reporter.error(CaptureErrorKind::NoSpeechDetected);
                    } else {
                        task_reporter.result(text);
                    }
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let code = stderr.lines().last().unwrap_or_default().trim();
                    warn!(status = %output.status, code, "recognizer exited with failure");
                    task_reporter.error(CaptureErrorKind::from_platform_code(code));
                }
                Err(e) => {
                    warn!("Failed to wait for recognizer: {}", e);
                    task_reporter.error(CaptureErrorKind::Unknown);
                }
            }
            task_reporter.ended();
        });

        self.running = Some((task, reporter));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((task, reporter)) = self.running.take() {
            if !task.is_finished() {
                // Dropping the child with the task kills the process.
                task.abort();
                reporter.error(CaptureErrorKind::Aborted);
                reporter.ended();
            }
        }
    }
}
