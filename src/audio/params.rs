use serde::Deserialize;
use thiserror::Error;

use super::bands::BandLayout;

/// Samples per analysis frame in the canonical profile (11.7 Hz/bin at 48 kHz)
pub const FRAME_SIZE: usize = 4096;
/// New samples between analyses (~10.7 ms at 48 kHz)
pub const HOP_SIZE: usize = 512;
/// Weight kept from the previous smoothed value
pub const SMOOTHING: f32 = 0.3;

/// Earlier tuning: shorter window, heavier smoothing, linear band spacing
pub const LEGACY_FRAME_SIZE: usize = 2048;
pub const LEGACY_HOP_SIZE: usize = 512;
pub const LEGACY_SMOOTHING: f32 = 0.55;

/// dB level mapped to 0.0
pub const DB_MIN: f32 = -80.0;
/// dB level mapped to 1.0
pub const DB_MAX: f32 = -20.0;
/// Magnitudes below this are treated as silence
pub const MAGNITUDE_EPSILON: f32 = 1e-10;
/// dB value assigned to silence
pub const DB_FLOOR: f32 = -100.0;

/// Sample rate assumed until the capture source reports one
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Layout of interleaved PCM handed over by a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

/// Sample encodings the ingest stage can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// IEEE float, little endian
    F32,
    /// Signed 16-bit integer, little endian
    I16,
}

impl PcmFormat {
    pub fn f32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 32,
            channels,
        }
    }

    pub fn encoding(&self) -> Option<SampleEncoding> {
        match self.bits_per_sample {
            32 => Some(SampleEncoding::F32),
            16 => Some(SampleEncoding::I16),
            _ => None,
        }
    }

    /// Bytes per interleaved frame (all channels of one sample instant)
    pub fn frame_stride(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisProfile {
    #[default]
    Canonical,
    Legacy,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("frame_size must be a power of two >= 8, got {0}")]
    FrameSize(usize),
    #[error("hop_size must be in 1..={frame}, got {hop}")]
    HopSize { hop: usize, frame: usize },
    #[error("smoothing must be in [0, 1), got {0}")]
    Smoothing(f32),
    #[error("db_min ({min}) must be below db_max ({max})")]
    DbRange { min: f32, max: f32 },
}

/// Tunables for the capture-side analysis chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisParams {
    pub frame_size: usize,
    pub hop_size: usize,
    pub smoothing: f32,
    pub db_min: f32,
    pub db_max: f32,
    pub layout: BandLayout,
}

impl AnalysisParams {
    pub fn canonical() -> Self {
        Self {
            frame_size: FRAME_SIZE,
            hop_size: HOP_SIZE,
            smoothing: SMOOTHING,
            db_min: DB_MIN,
            db_max: DB_MAX,
            layout: BandLayout::Segmented,
        }
    }

    pub fn legacy() -> Self {
        Self {
            frame_size: LEGACY_FRAME_SIZE,
            hop_size: LEGACY_HOP_SIZE,
            smoothing: LEGACY_SMOOTHING,
            layout: BandLayout::Linear,
            ..Self::canonical()
        }
    }

    pub fn for_profile(profile: AnalysisProfile) -> Self {
        match profile {
            AnalysisProfile::Canonical => Self::canonical(),
            AnalysisProfile::Legacy => Self::legacy(),
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.frame_size.is_power_of_two() || self.frame_size < 8 {
            return Err(ParamsError::FrameSize(self.frame_size));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(ParamsError::HopSize {
                hop: self.hop_size,
                frame: self.frame_size,
            });
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ParamsError::Smoothing(self.smoothing));
        }
        if !(self.db_min < self.db_max) {
            return Err(ParamsError::DbRange {
                min: self.db_min,
                max: self.db_max,
            });
        }
        Ok(())
    }
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self::canonical()
    }
}
