//! Capture sources
//!
//! A source owns the [`AnalysisPipeline`] once started and drives it from its
//! own callback thread. Stopping is idempotent and returns only after the
//! callback thread is done with the pipeline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::decode::decode_audio;
use super::params::PcmFormat;
use super::pipeline::AnalysisPipeline;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No audio output device found")]
    NoDevice,

    #[error("Failed to get default config: {0}")]
    DefaultConfig(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(String),

    #[error("Failed to play stream: {0}")]
    PlayStream(String),

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Capture already started")]
    AlreadyStarted,

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What a source reported when it started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInfo {
    pub name: String,
    pub format: PcmFormat,
}

pub trait CaptureSource {
    /// Start delivering audio into `pipeline`
    fn start(&mut self, pipeline: AnalysisPipeline) -> Result<CaptureInfo, CaptureError>;

    /// Stop delivering audio. Safe to call repeatedly and before `start`.
    fn stop(&mut self);

    /// False once stopped or once the source has run out of data
    fn is_running(&self) -> bool;
}

/// Interleaved frames per replay chunk (10 ms at 48 kHz)
pub const REPLAY_CHUNK_FRAMES: usize = 480;

/// Replays a decoded audio file in real time, standing in for a capture device.
pub struct FileReplay {
    path: PathBuf,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FileReplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl CaptureSource for FileReplay {
    fn start(&mut self, mut pipeline: AnalysisPipeline) -> Result<CaptureInfo, CaptureError> {
        if self.handle.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let audio = decode_audio(&self.path).map_err(|err| CaptureError::Decode {
            path: self.path.clone(),
            reason: format!("{:#}", err),
        })?;
        let format = audio.format();
        let chunk_len = REPLAY_CHUNK_FRAMES * format.channels.max(1) as usize;
        let chunk_duration =
            Duration::from_secs_f64(REPLAY_CHUNK_FRAMES as f64 / format.sample_rate.max(1) as f64);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("deskwave-replay".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                for chunk in audio.samples.chunks(chunk_len) {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let bytes: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
                    pipeline.push(&bytes, format);

                    deadline += chunk_duration;
                    if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    }
                }
                running.store(false, Ordering::SeqCst);
                log::info!("Replay finished");
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        self.handle = Some(handle);

        Ok(CaptureInfo {
            name: self.path.display().to_string(),
            format,
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Replay thread panicked");
            }
            log::info!("Replay stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for FileReplay {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "loopback")]
pub use loopback::LoopbackCapture;

#[cfg(feature = "loopback")]
mod loopback {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream};

    use super::{CaptureError, CaptureInfo, CaptureSource};
    use crate::audio::params::PcmFormat;
    use crate::audio::pipeline::AnalysisPipeline;

    /// Captures what the default output device is playing.
    ///
    /// Opening an input stream on an output device yields loopback capture on
    /// WASAPI; other hosts need a monitor device to be the default output.
    #[derive(Default)]
    pub struct LoopbackCapture {
        stream: Option<Stream>,
    }

    impl LoopbackCapture {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl CaptureSource for LoopbackCapture {
        fn start(&mut self, mut pipeline: AnalysisPipeline) -> Result<CaptureInfo, CaptureError> {
            if self.stream.is_some() {
                return Err(CaptureError::AlreadyStarted);
            }
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(CaptureError::NoDevice)?;
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

            let supported = device
                .default_output_config()
                .map_err(|e| CaptureError::DefaultConfig(e.to_string()))?;
            let sample_format = supported.sample_format();
            let bits_per_sample = match sample_format {
                SampleFormat::F32 => 32,
                SampleFormat::I16 => 16,
                other => return Err(CaptureError::UnsupportedFormat(format!("{:?}", other))),
            };
            let config: cpal::StreamConfig = supported.into();
            let format = PcmFormat {
                sample_rate: config.sample_rate.0,
                bits_per_sample,
                channels: config.channels,
            };

            let stream = device
                .build_input_stream_raw(
                    &config,
                    sample_format,
                    move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                        pipeline.push(data.bytes(), format);
                    },
                    |err| log::error!("Loopback stream error: {}", err),
                    None,
                )
                .map_err(|e| CaptureError::BuildStream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| CaptureError::PlayStream(e.to_string()))?;

            log::info!(
                "Loopback capture started: {} ({} Hz, {} ch, {}-bit)",
                name,
                format.sample_rate,
                format.channels,
                format.bits_per_sample
            );
            self.stream = Some(stream);
            Ok(CaptureInfo { name, format })
        }

        fn stop(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(err) = stream.pause() {
                    log::warn!("Error pausing loopback stream: {}", err);
                }
                // Dropping the stream waits for the host to release the callback
                drop(stream);
                log::info!("Loopback capture stopped");
            }
        }

        fn is_running(&self) -> bool {
            self.stream.is_some()
        }
    }

    impl Drop for LoopbackCapture {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::params::AnalysisParams;

    #[test]
    fn test_missing_file_fails_to_start() {
        let mut replay = FileReplay::new("/nonexistent/deskwave/input.wav");
        let (pipeline, feed) = AnalysisPipeline::new(&AnalysisParams::canonical());
        let err = replay.start(pipeline).unwrap_err();
        assert!(matches!(err, CaptureError::Decode { .. }));
        assert!(!replay.is_running());
        // Degraded mode: the feed still answers with silence
        assert_eq!(feed.snapshot(), [0.0; 64]);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let mut replay = FileReplay::new("unused.wav");
        replay.stop();
        replay.stop();
        assert!(!replay.is_running());
    }
}
