//! The display loop: capture, band feed, pointer and filter worker together
//!
//! Teardown always stops capture first, then the filter worker, so the host is
//! left with the disabled directive after the last audio callback has run.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::capture::CaptureSource;
use crate::audio::ingest::{IngestCounters, IngestStats};
use crate::audio::params::AnalysisParams;
use crate::audio::pipeline::AnalysisPipeline;
use crate::feed::BandEmitter;
use crate::filter::sync::FilterStatus;
use crate::filter::worker::SyncWorker;
use crate::pointer::PointerSource;

pub const DEFAULT_FPS: u32 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Display ticks per second
    pub fps: u32,
    /// Stop after this long; run until input ends otherwise
    pub duration: Option<Duration>,
    /// Write band frames to the output sink
    pub emit_feed: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            duration: None,
            emit_feed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Duration,
    CaptureEnded,
    InputClosed,
    OutputClosed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub elapsed: Duration,
    pub ticks: u64,
    /// Ticks the filter worker was too busy to take
    pub dropped_ticks: u64,
    pub frames_emitted: u64,
    pub ingest: IngestStats,
    pub filter: FilterStatus,
}

pub struct Session<W: Write> {
    capture: Box<dyn CaptureSource>,
    capture_live: bool,
    counters: Arc<IngestCounters>,
    emitter: BandEmitter<W>,
    pointer: Box<dyn PointerSource>,
    worker: SyncWorker,
    options: SessionOptions,
    interrupt: Arc<AtomicBool>,
    stopped: bool,
}

impl<W: Write> Session<W> {
    /// Build the analysis pipeline and hand it to `capture`.
    ///
    /// A capture source that fails to start is reported once; the session then
    /// runs on with an all-zero band feed.
    pub fn start(
        mut capture: Box<dyn CaptureSource>,
        params: &AnalysisParams,
        pointer: Box<dyn PointerSource>,
        worker: SyncWorker,
        options: SessionOptions,
        out: W,
    ) -> Self {
        let (pipeline, feed) = AnalysisPipeline::new(params);
        let counters = pipeline.counters();
        let capture_live = match capture.start(pipeline) {
            Ok(info) => {
                log::info!(
                    "Capturing from {} ({} Hz, {} ch)",
                    info.name,
                    info.format.sample_rate,
                    info.format.channels
                );
                true
            }
            Err(err) => {
                log::error!("Capture unavailable: {}; bands stay silent", err);
                false
            }
        };

        Self {
            capture,
            capture_live,
            counters,
            emitter: BandEmitter::new(feed, out),
            pointer,
            worker,
            options,
            interrupt: Arc::new(AtomicBool::new(false)),
            stopped: false,
        }
    }

    /// Setting this flag ends the loop at the next tick
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn capture_live(&self) -> bool {
        self.capture_live
    }

    pub fn run(&mut self) -> SessionSummary {
        let frame_time = Duration::from_secs_f64(1.0 / self.options.fps.max(1) as f64);
        let started = Instant::now();
        let mut next_tick = started;
        let mut ticks = 0u64;
        let mut dropped_ticks = 0u64;

        let reason = loop {
            let elapsed = started.elapsed();

            for command in self.pointer.take_commands() {
                self.worker.send(command);
            }
            let position = self.pointer.position(elapsed);
            if !self.worker.tick(position) {
                dropped_ticks += 1;
            }
            ticks += 1;

            if self.options.emit_feed {
                if let Err(err) = self.emitter.emit_if_changed() {
                    log::warn!("Band output closed: {}", err);
                    break StopReason::OutputClosed;
                }
            }

            if self.interrupt.load(Ordering::SeqCst) {
                break StopReason::Interrupted;
            }
            if self.options.duration.is_some_and(|limit| elapsed >= limit) {
                break StopReason::Duration;
            }
            if self.capture_live && !self.capture.is_running() {
                break StopReason::CaptureEnded;
            }
            if self.pointer.is_exhausted() {
                break StopReason::InputClosed;
            }

            next_tick += frame_time;
            match next_tick.checked_duration_since(Instant::now()) {
                Some(wait) => thread::sleep(wait),
                // Fell behind; skip the missed ticks instead of bursting
                None => next_tick = Instant::now(),
            }
        };

        self.stop();
        let summary = SessionSummary {
            reason,
            elapsed: started.elapsed(),
            ticks,
            dropped_ticks,
            frames_emitted: self.emitter.emitted(),
            ingest: self.counters.stats(),
            filter: self.worker.status(),
        };
        log::info!(
            "Session ended ({:?}) after {:.1}s: {} ticks ({} dropped), {} band frames, {} analyses, {}/{} buffers dropped",
            summary.reason,
            summary.elapsed.as_secs_f64(),
            summary.ticks,
            summary.dropped_ticks,
            summary.frames_emitted,
            summary.ingest.analyses,
            summary.ingest.frames_dropped,
            summary.ingest.frames_accepted + summary.ingest.frames_dropped,
        );
        summary
    }

    /// Stop capture, then the filter worker. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.capture.stop();
        self.worker.shutdown();
    }
}

impl<W: Write> Drop for Session<W> {
    fn drop(&mut self) {
        self.stop();
    }
}
