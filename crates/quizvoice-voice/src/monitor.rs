//! Live microphone level metering while a capture attempt runs.

use crate::error::MicrophoneError;
use crate::events::LevelReporter;
use quizvoice_types::MicPermission;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Samples per analysis frame.
pub const FFT_SIZE: usize = 256;

const SMOOTHING: f32 = 0.8;
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Opens microphone streams. Opening may block while the platform asks the
/// user for permission.
pub trait MicrophoneProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn MicrophoneStream>, MicrophoneError>;
}

/// An open microphone. Dropping it releases the device.
pub trait MicrophoneStream: Send {
    /// Fills `frame` with the most recent samples in `[-1, 1]`. Returns
    /// `false` once the stream has ended.
    fn read_frame(&mut self, frame: &mut [f32]) -> bool;
}

/// Turns time-domain frames into a single loudness figure in `[0, 1]`.
///
/// Each frame is Blackman-windowed and transformed; bin magnitudes are
/// smoothed over time, mapped from `[-100, -30]` dB onto `0..=255`, and
/// averaged. The average over 128 (clamped to 1) is the level.
pub struct SpectrumAnalyser {
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    smoothed: Vec<f32>,
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let n = FFT_SIZE as f32;
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / n;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();
        let cos_table = (0..FFT_SIZE).map(|i| (2.0 * PI * i as f32 / n).cos()).collect();
        let sin_table = (0..FFT_SIZE).map(|i| (2.0 * PI * i as f32 / n).sin()).collect();
        Self {
            window,
            cos_table,
            sin_table,
            smoothed: vec![0.0; FFT_SIZE / 2],
        }
    }

    /// Feeds one frame and returns the current level.
    pub fn level(&mut self, frame: &[f32]) -> f32 {
        let mut windowed = [0.0f32; FFT_SIZE];
        for (i, slot) in windowed.iter_mut().enumerate() {
            *slot = frame.get(i).copied().unwrap_or(0.0) * self.window[i];
        }

        let mut total = 0.0f32;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let (mut re, mut im) = (0.0f32, 0.0f32);
            for (n, sample) in windowed.iter().enumerate() {
                let idx = (k * n) % FFT_SIZE;
                re += sample * self.cos_table[idx];
                im -= sample * self.sin_table[idx];
            }
            let magnitude = (re * re + im * im).sqrt() / FFT_SIZE as f32;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;

            let db = 20.0 * smoothed.max(1e-12).log10();
            let byte = (255.0 / (MAX_DB - MIN_DB) * (db - MIN_DB)).clamp(0.0, 255.0).floor();
            total += byte;
        }

        let average = total / self.smoothed.len() as f32;
        (average / 128.0).min(1.0)
    }
}

/// Runs a level-metering task alongside each capture attempt.
///
/// Acquisition failures are reported as permission changes and never stop
/// the capture itself.
pub struct AudioLevelMonitor {
    provider: Option<Arc<dyn MicrophoneProvider>>,
    frame_interval: Duration,
    acquire_timeout: Duration,
    running: Option<(u64, JoinHandle<()>)>,
}

impl AudioLevelMonitor {
    pub fn new(
        provider: Option<Arc<dyn MicrophoneProvider>>,
        frame_interval: Duration,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            frame_interval,
            acquire_timeout,
            running: None,
        }
    }

    pub fn generation(&self) -> Option<u64> {
        self.running.as_ref().map(|(generation, _)| *generation)
    }

    pub fn start(&mut self, reporter: LevelReporter) {
        self.stop();
        let generation = reporter.generation();

        let Some(provider) = self.provider.clone() else {
            debug!(generation, "no microphone provider; level metering disabled");
            reporter.permission(MicPermission::Unavailable);
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; level metering disabled");
            reporter.permission(MicPermission::Unavailable);
            return;
        };

        let task = runtime.spawn(meter(
            provider,
            reporter,
            self.frame_interval,
            self.acquire_timeout,
        ));
        self.running = Some((generation, task));
    }

    /// Stops metering and releases the microphone. Idempotent.
    pub fn stop(&mut self) {
        if let Some((generation, task)) = self.running.take() {
            task.abort();
            debug!(generation, "level monitor stopped");
        }
    }
}

impl Drop for AudioLevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn meter(
    provider: Arc<dyn MicrophoneProvider>,
    reporter: LevelReporter,
    frame_interval: Duration,
    acquire_timeout: Duration,
) {
    let opened = tokio::time::timeout(
        acquire_timeout,
        tokio::task::spawn_blocking(move || provider.open()),
    )
    .await;

    let mut stream = match opened {
        Ok(Ok(Ok(stream))) => stream,
        Ok(Ok(Err(MicrophoneError::Denied))) => {
            reporter.permission(MicPermission::Denied);
            return;
        }
        Ok(Ok(Err(e))) => {
            warn!("microphone unavailable: {}", e);
            reporter.permission(MicPermission::Unavailable);
            return;
        }
        Ok(Err(e)) => {
            warn!("microphone open task failed: {}", e);
            reporter.permission(MicPermission::Unavailable);
            return;
        }
        Err(_) => {
            warn!(
                "microphone acquisition timed out after {} ms",
                acquire_timeout.as_millis()
            );
            reporter.permission(MicPermission::Unavailable);
            return;
        }
    };
    reporter.permission(MicPermission::Granted);

    let mut analyser = SpectrumAnalyser::new();
    let mut frame = vec![0.0f32; FFT_SIZE];
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if reporter.is_closed() || !stream.read_frame(&mut frame) {
            break;
        }
        reporter.level(analyser.level(&frame));
    }
}

/// Replays a WAV file as a microphone. Used by headless hosts and demos.
pub struct WavMicrophone {
    path: PathBuf,
}

impl WavMicrophone {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl MicrophoneProvider for WavMicrophone {
    fn open(&self) -> Result<Box<dyn MicrophoneStream>, MicrophoneError> {
        let reader = hound::WavReader::open(&self.path)
            .map_err(|e| MicrophoneError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| MicrophoneError::Unavailable(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| MicrophoneError::Unavailable(e.to_string()))?
            }
        };
        // Keep the first channel only.
        let channels = spec.channels.max(1) as usize;
        let mono = samples.into_iter().step_by(channels).collect();
        Ok(Box::new(SampleStream {
            samples: mono,
            position: 0,
        }))
    }
}

struct SampleStream {
    samples: Vec<f32>,
    position: usize,
}

impl MicrophoneStream for SampleStream {
    fn read_frame(&mut self, frame: &mut [f32]) -> bool {
        if self.position >= self.samples.len() {
            return false;
        }
        let end = (self.position + frame.len()).min(self.samples.len());
        let chunk = &self.samples[self.position..end];
        frame[..chunk.len()].copy_from_slice(chunk);
        frame[chunk.len()..].fill(0.0);
        self.position = end;
        true
    }
}
