//! Speech output: the synthesizer seam, the last-write-wins wrapper with
//! fallback, and two synthesizers (a local command and the speech server).

use crate::error::VoiceError;
use crate::events::OutputReporter;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A text-to-speech engine.
///
/// `speak` starts one utterance and eventually reports `done` or `failed`
/// through the reporter, unless `cancel` is called first. A cancelled
/// utterance reports nothing.
pub trait SpeechSynthesizer: Send {
    fn name(&self) -> &'static str;

    fn speak(&mut self, text: &str, reporter: OutputReporter) -> Result<(), VoiceError>;

    fn cancel(&mut self);
}

struct Utterance {
    text: String,
    reporter: OutputReporter,
    on_fallback: bool,
}

/// What happened after the active utterance failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// The fallback engine is now speaking the same text.
    Retried,
    /// No engine could speak it.
    Exhausted,
}

/// Speaks one utterance at a time.
///
/// A new `speak` cancels the one in flight. If the primary engine fails, the
/// utterance is retried once on the fallback engine.
pub struct SpeechOutput {
    primary: Box<dyn SpeechSynthesizer>,
    fallback: Option<Box<dyn SpeechSynthesizer>>,
    current: Option<Utterance>,
}

impl SpeechOutput {
    pub fn new(
        primary: Box<dyn SpeechSynthesizer>,
        fallback: Option<Box<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            current: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Generation of the utterance in flight.
    pub fn generation(&self) -> Option<u64> {
        self.current.as_ref().map(|u| u.reporter.generation())
    }

    pub fn speak(&mut self, text: &str, reporter: OutputReporter) -> Result<(), VoiceError> {
        self.cancel();
        debug!(generation = reporter.generation(), text, "speaking");

        match self.primary.speak(text, reporter.clone()) {
            Ok(()) => {
                self.current = Some(Utterance {
                    text: text.to_string(),
                    reporter,
                    on_fallback: false,
                });
                Ok(())
            }
            Err(e) => {
                warn!("{} could not speak: {}", self.primary.name(), e);
                let fallback = self.fallback.as_mut().ok_or(e)?;
                fallback.speak(text, reporter.clone())?;
                self.current = Some(Utterance {
                    text: text.to_string(),
                    reporter,
                    on_fallback: true,
                });
                Ok(())
            }
        }
    }

    /// Cancels the utterance in flight. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(utterance) = self.current.take() {
            if utterance.on_fallback {
                if let Some(fallback) = self.fallback.as_mut() {
                    fallback.cancel();
                }
            } else {
                self.primary.cancel();
            }
        }
    }

    /// Marks the utterance with this generation as finished.
    pub fn finish(&mut self, generation: u64) {
        if self.generation() == Some(generation) {
            self.current = None;
        }
    }

    /// Handles a failure report for the utterance in flight.
    pub fn on_failed(&mut self, generation: u64, reason: &str) -> FallbackOutcome {
        let Some(utterance) = self.current.as_mut() else {
            return FallbackOutcome::Exhausted;
        };
        if utterance.reporter.generation() != generation {
            return FallbackOutcome::Exhausted;
        }

        warn!(generation, reason, "speech output failed");
        if !utterance.on_fallback {
            if let Some(fallback) = self.fallback.as_mut() {
                match fallback.speak(&utterance.text, utterance.reporter.clone()) {
                    Ok(()) => {
                        utterance.on_fallback = true;
                        return FallbackOutcome::Retried;
                    }
                    Err(e) => warn!("{} could not speak: {}", fallback.name(), e),
                }
            }
        }
        self.current = None;
        FallbackOutcome::Exhausted
    }
}

fn runtime() -> Result<tokio::runtime::Handle, VoiceError> {
    tokio::runtime::Handle::try_current()
        .map_err(|_| VoiceError::Tts("no async runtime".to_string()))
}

/// Speaks through a local command such as `espeak-ng`.
///
/// `{text}` in any argument is replaced with the utterance; without a
/// placeholder the text is written to the command's stdin.
pub struct ProcessSynthesizer {
    program: String,
    args: Vec<String>,
    running: Option<JoinHandle<()>>,
}

impl ProcessSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            running: None,
        }
    }

    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl SpeechSynthesizer for ProcessSynthesizer {
    fn name(&self) -> &'static str {
        "local synthesizer"
    }

    fn speak(&mut self, text: &str, reporter: OutputReporter) -> Result<(), VoiceError> {
        self.cancel();
        let runtime = runtime()?;

        let inline = self.args.iter().any(|a| a.contains("{text}"));
        let mut command = Command::new(&self.program);
        command
            .args(self.args.iter().map(|a| a.replace("{text}", text)))
            .stdin(if inline { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = {
            let _guard = runtime.enter();
            command
                .spawn()
                .map_err(|e| VoiceError::Tts(format!("Failed to spawn {}: {}", self.program, e)))?
        };
        let stdin_text = (!inline).then(|| text.to_string());
        let stdin = child.stdin.take();

        self.running = Some(runtime.spawn(async move {
            if let (Some(mut stdin), Some(text)) = (stdin, stdin_text) {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    reporter.failed(format!("Failed to write to synthesizer stdin: {}", e));
                    return;
                }
            }
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => reporter.done(),
                Ok(output) => reporter.failed(format!(
                    "synthesizer failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
                Err(e) => reporter.failed(format!("Failed to wait for synthesizer: {}", e)),
            }
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.running.take() {
            task.abort();
        }
    }
}

/// Fetches audio from the speech server's `POST /tts` and pipes it into a
/// local player such as `aplay -q -`.
pub struct RemoteSynthesizer {
    client: reqwest::Client,
    url: String,
    player: Vec<String>,
    running: Option<JoinHandle<()>>,
}

impl RemoteSynthesizer {
    /// `timeout` bounds the fetch; playback itself is not bounded here.
    pub fn new(url: impl Into<String>, player: Vec<String>, timeout: Duration) -> Result<Self, VoiceError> {
        if player.is_empty() {
            return Err(VoiceError::Config(
                "tts.player_command must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            player,
            running: None,
        })
    }
}

impl SpeechSynthesizer for RemoteSynthesizer {
    fn name(&self) -> &'static str {
        "speech server"
    }

    fn speak(&mut self, text: &str, reporter: OutputReporter) -> Result<(), VoiceError> {
        self.cancel();
        let runtime = runtime()?;

        let request = self.client.post(&self.url).form(&[("text", text)]);
        let player = self.player.clone();

        self.running = Some(runtime.spawn(async move {
            match fetch_and_play(request, &player).await {
                Ok(()) => reporter.done(),
                Err(e) => reporter.failed(e.to_string()),
            }
        }));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.running.take() {
            task.abort();
        }
    }
}

async fn fetch_and_play(request: reqwest::RequestBuilder, player: &[String]) -> Result<(), VoiceError> {
    let response = request
        .send()
        .await
        .map_err(|e| VoiceError::Tts(format!("TTS request failed: {}", e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(VoiceError::Tts(format!("TTS server returned HTTP {}", status.as_u16())));
    }
    let audio = response
        .bytes()
        .await
        .map_err(|e| VoiceError::Tts(format!("Failed to read TTS audio: {}", e)))?;
    if audio.is_empty() {
        return Err(VoiceError::Tts("TTS server returned no audio".to_string()));
    }

    let (program, args) = player
        .split_first()
        .ok_or_else(|| VoiceError::Config("empty player command".to_string()))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| VoiceError::Tts(format!("Failed to spawn player: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| VoiceError::Tts("Failed to open player stdin".to_string()))?;
    stdin
        .write_all(&audio)
        .await
        .map_err(|e| VoiceError::Tts(format!("Failed to write to player stdin: {}", e)))?;
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| VoiceError::Tts(format!("Failed to wait for player: {}", e)))?;
    if !output.status.success() {
        return Err(VoiceError::Tts(format!(
            "player failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, OutputEvent};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Log {
        spoken: Vec<(&'static str, String)>,
        cancels: usize,
    }

    struct Recording {
        name: &'static str,
        refuse: bool,
        log: Arc<Mutex<Log>>,
    }

    impl SpeechSynthesizer for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn speak(&mut self, text: &str, _reporter: OutputReporter) -> Result<(), VoiceError> {
            if self.refuse {
                return Err(VoiceError::Tts("refused".to_string()));
            }
            self.log
                .lock()
                .unwrap()
                .spoken
                .push((self.name, text.to_string()));
            Ok(())
        }

        fn cancel(&mut self) {
            self.log.lock().unwrap().cancels += 1;
        }
    }

    fn output(primary_refuses: bool) -> (SpeechOutput, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let primary = Recording {
            name: "primary",
            refuse: primary_refuses,
            log: log.clone(),
        };
        let fallback = Recording {
            name: "fallback",
            refuse: false,
            log: log.clone(),
        };
        (
            SpeechOutput::new(Box::new(primary), Some(Box::new(fallback))),
            log,
        )
    }

    #[test]
    fn new_utterance_cancels_previous() {
        let (tx, _rx) = mpsc::unbounded_channel::<Event>();
        let (mut output, log) = output(false);
        output.speak("one", OutputReporter::new(tx.clone(), 1)).unwrap();
        output.speak("two", OutputReporter::new(tx, 2)).unwrap();

        assert_eq!(output.generation(), Some(2));
        let log = log.lock().unwrap();
        assert_eq!(log.cancels, 1);
        assert_eq!(log.spoken.len(), 2);
    }

    #[test]
    fn failure_retries_once_on_fallback() {
        let (tx, _rx) = mpsc::unbounded_channel::<Event>();
        let (mut output, log) = output(false);
        output.speak("hello", OutputReporter::new(tx, 5)).unwrap();

        assert_eq!(output.on_failed(4, "stale"), FallbackOutcome::Exhausted);
        assert_eq!(output.on_failed(5, "boom"), FallbackOutcome::Retried);
        assert_eq!(output.generation(), Some(5));
        assert_eq!(output.on_failed(5, "boom again"), FallbackOutcome::Exhausted);
        assert!(!output.is_active());

        let log = log.lock().unwrap();
        assert_eq!(log.spoken[1], ("fallback", "hello".to_string()));
    }

    #[test]
    fn refused_primary_falls_back_synchronously() {
        let (tx, _rx) = mpsc::unbounded_channel::<Event>();
        let (mut output, log) = output(true);
        output.speak("hi", OutputReporter::new(tx, 1)).unwrap();
        assert!(output.is_active());
        assert_eq!(log.lock().unwrap().spoken[0].0, "fallback");
    }

    #[test]
    fn finish_ignores_other_generations() {
        let (tx, _rx) = mpsc::unbounded_channel::<Event>();
        let (mut output, _log) = output(false);
        output.speak("hi", OutputReporter::new(tx, 3)).unwrap();
        output.finish(2);
        assert!(output.is_active());
        output.finish(3);
        assert!(!output.is_active());
    }

    #[tokio::test]
    async fn process_synthesizer_reports_done() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut synth = ProcessSynthesizer::new("true", vec!["{text}".to_string()]);
        synth.speak("hello", OutputReporter::new(tx, 9)).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            Event::Output {
                generation: 9,
                event: OutputEvent::Done
            }
        );
    }

    #[tokio::test]
    async fn process_synthesizer_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut synth = ProcessSynthesizer::new("false", vec![]);
        synth.speak("hello", OutputReporter::new(tx, 2)).unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            Event::Output {
                generation: 2,
                event: OutputEvent::Failed(_)
            }
        ));
    }

    #[tokio::test]
    async fn missing_program_is_refused() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut synth = ProcessSynthesizer::new("/nonexistent/quizvoice-tts", vec![]);
        assert!(synth.speak("hello", OutputReporter::new(tx, 1)).is_err());
    }
}
