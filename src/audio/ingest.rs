//! Capture-side sample intake
//!
//! Interleaved PCM bytes from the capture callback are down-mixed to mono and
//! written into a fixed ring. Every `hop_size` samples, once the ring has been
//! filled, the most recent frame is copied out in chronological order and handed
//! to the analysis closure. Everything here runs on the capture thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::params::{PcmFormat, SampleEncoding};

/// Fixed-capacity mono sample ring. Capacity is always a power of two.
pub struct SampleRingBuffer {
    samples: Vec<f32>,
    mask: usize,
    write_pos: usize,
    filled: bool,
}

impl SampleRingBuffer {
    /// Create a ring holding `capacity` samples, rounded up to a power of two
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            samples: vec![0.0; capacity],
            mask: capacity - 1,
            write_pos: 0,
            filled: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// True once every slot has been written at least once
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn push(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) & self.mask;
        if self.write_pos == 0 {
            self.filled = true;
        }
    }

    /// Copy the ring into `out`, oldest retained sample first
    pub fn copy_chronological(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.capacity());
        let (newer, older) = self.samples.split_at(self.write_pos);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
    }
}

/// Diagnostics shared with the control side.
#[derive(Debug, Default)]
pub struct IngestCounters {
    frames_accepted: AtomicU64,
    frames_dropped: AtomicU64,
    samples_written: AtomicU64,
    analyses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    /// Capture buffers accepted
    pub frames_accepted: u64,
    /// Capture buffers rejected as malformed or unsupported
    pub frames_dropped: u64,
    /// Mono samples written to the ring
    pub samples_written: u64,
    /// Analysis frames handed downstream
    pub analyses: u64,
}

impl IngestCounters {
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            analyses: self.analyses.load(Ordering::Relaxed),
        }
    }
}

pub struct SampleIngest {
    ring: SampleRingBuffer,
    hop_size: usize,
    since_last_analysis: usize,
    frame: Vec<f32>,
    counters: Arc<IngestCounters>,
}

impl SampleIngest {
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        let ring = SampleRingBuffer::new(frame_size);
        let frame = vec![0.0; ring.capacity()];
        Self {
            ring,
            hop_size: hop_size.max(1),
            since_last_analysis: 0,
            frame,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.ring.capacity()
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Feed one capture buffer.
    ///
    /// `on_frame` runs synchronously for every hop boundary crossed inside this
    /// buffer, receiving the latest full analysis frame. Buffers whose length is
    /// not a whole number of frames, or whose encoding is unsupported, are
    /// dropped and counted.
    pub fn ingest<F>(&mut self, bytes: &[u8], format: PcmFormat, mut on_frame: F)
    where
        F: FnMut(&[f32]),
    {
        if bytes.is_empty() {
            return;
        }
        let stride = format.frame_stride();
        let encoding = match format.encoding() {
            Some(encoding) if stride > 0 && bytes.len() % stride == 0 => encoding,
            _ => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        self.counters.frames_accepted.fetch_add(1, Ordering::Relaxed);

        let channels = format.channels as usize;
        let width = stride / channels;
        for frame_bytes in bytes.chunks_exact(stride) {
            let sum: f32 = frame_bytes
                .chunks_exact(width)
                .map(|raw| decode_sample(raw, encoding))
                .sum();
            self.push(sum / channels as f32, &mut on_frame);
        }
        self.counters
            .samples_written
            .fetch_add((bytes.len() / stride) as u64, Ordering::Relaxed);
    }

    /// Feed already-mono samples
    #[cfg(test)]
    fn ingest_mono<F>(&mut self, samples: &[f32], mut on_frame: F)
    where
        F: FnMut(&[f32]),
    {
        for &sample in samples {
            self.push(sample, &mut on_frame);
        }
        self.counters
            .samples_written
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
    }

    fn push<F>(&mut self, sample: f32, on_frame: &mut F)
    where
        F: FnMut(&[f32]),
    {
        // Non-finite input would poison every band for a whole frame
        let sample = if sample.is_finite() { sample } else { 0.0 };
        self.ring.push(sample);
        self.since_last_analysis += 1;

        if self.since_last_analysis >= self.hop_size && self.ring.is_filled() {
            self.ring.copy_chronological(&mut self.frame);
            self.since_last_analysis = 0;
            self.counters.analyses.fetch_add(1, Ordering::Relaxed);
            on_frame(&self.frame);
        }
    }
}

fn decode_sample(raw: &[u8], encoding: SampleEncoding) -> f32 {
    match encoding {
        SampleEncoding::F32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        SampleEncoding::I16 => i16::from_le_bytes([raw[0], raw[1]]) as f32 / 32768.0,
    }
}
