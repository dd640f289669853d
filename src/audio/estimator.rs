//! Sparse spectral estimator
//!
//! Instead of a full transform, each of the 64 bands evaluates a single DFT
//! coefficient at its (fractional) center bin. That costs O(N * 64) per hop
//! and places every band exactly on its musical center frequency.

use std::f64::consts::TAU;

use super::bands::{BandTable, BAND_COUNT};

pub type BandMagnitudes = [f32; BAND_COUNT];

pub struct SpectralEstimator {
    frame_size: usize,
    table: BandTable,
    bins: [f64; BAND_COUNT],
    window: Vec<f32>,
    windowed: Vec<f32>,
}

impl SpectralEstimator {
    pub fn new(frame_size: usize, table: BandTable) -> Self {
        let bins = band_bins(&table, frame_size);
        Self {
            frame_size,
            table,
            bins,
            window: hann_window(frame_size),
            windowed: vec![0.0; frame_size],
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn table(&self) -> &BandTable {
        &self.table
    }

    /// Fractional bin evaluated for each band
    pub fn bins(&self) -> &[f64; BAND_COUNT] {
        &self.bins
    }

    /// Rebuild the band table when the capture format changes. Returns true if
    /// anything was rebuilt.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> bool {
        if sample_rate == self.table.sample_rate() {
            return false;
        }
        log::debug!(
            "Band table rebuilt: {} Hz -> {} Hz",
            self.table.sample_rate(),
            sample_rate
        );
        self.table = BandTable::new(sample_rate, self.table.layout());
        self.bins = band_bins(&self.table, self.frame_size);
        true
    }

    /// Hann-window `frame` and measure each band's magnitude.
    ///
    /// `frame` shorter than the analysis size is zero-padded; longer frames are
    /// truncated to the most recent `frame_size` samples.
    pub fn analyze(&mut self, frame: &[f32]) -> BandMagnitudes {
        let n = self.frame_size;
        let frame = &frame[frame.len().saturating_sub(n)..];
        for (i, out) in self.windowed.iter_mut().enumerate() {
            *out = frame.get(i).copied().unwrap_or(0.0) * self.window[i];
        }

        let mut magnitudes = [0.0; BAND_COUNT];
        for (magnitude, &k) in magnitudes.iter_mut().zip(self.bins.iter()) {
            *magnitude = dft_magnitude(&self.windowed, k);
        }
        magnitudes
    }
}

/// Hann window, `0.5 * (1 - cos(2*pi*i / (N - 1)))`. A single-point window is 1.0.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Bin position of `center_hz`, clamped to `[1, N/2 - 1]`
pub fn fractional_bin(center_hz: f32, sample_rate: u32, frame_size: usize) -> f64 {
    let upper = (frame_size / 2) as f64 - 1.0;
    if upper <= 1.0 || sample_rate == 0 {
        return 1.0;
    }
    let hz_per_bin = sample_rate as f64 / frame_size as f64;
    (center_hz as f64 / hz_per_bin).clamp(1.0, upper)
}

/// `|X(k)| / N` for a possibly non-integer bin `k`.
///
/// The phasor is advanced by rotation rather than calling sin/cos per sample,
/// with f64 accumulators so phase error stays negligible over 4096 samples.
pub fn dft_magnitude(windowed: &[f32], k: f64) -> f32 {
    let n = windowed.len();
    if n == 0 {
        return 0.0;
    }
    let (step_sin, step_cos) = (TAU * k / n as f64).sin_cos();
    let (mut cos, mut sin) = (1.0f64, 0.0f64);
    let (mut real, mut imag) = (0.0f64, 0.0f64);

    for &x in windowed {
        let x = x as f64;
        real += x * cos;
        imag -= x * sin;
        let next_cos = cos * step_cos - sin * step_sin;
        sin = sin * step_cos + cos * step_sin;
        cos = next_cos;
    }

    ((real * real + imag * imag).sqrt() / n as f64) as f32
}

fn band_bins(table: &BandTable, frame_size: usize) -> [f64; BAND_COUNT] {
    std::array::from_fn(|i| fractional_bin(table.center_hz(i), table.sample_rate(), frame_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bands::BandLayout;

    fn sine(freq_hz: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let phase = TAU * freq_hz as f64 * i as f64 / sample_rate as f64;
                amplitude * phase.sin() as f32
            })
            .collect()
    }

    fn estimator(sample_rate: u32) -> SpectralEstimator {
        SpectralEstimator::new(4096, BandTable::new(sample_rate, BandLayout::Segmented))
    }

    #[test]
    fn test_hann_window() {
        let size = 1024;
        let window = hann_window(size);
        assert!(window[0].abs() < 1e-6);
        assert!(window[size - 1].abs() < 1e-6);
        assert!((window[size / 2] - 1.0).abs() < 0.01);
        assert_eq!(hann_window(1), vec![1.0]);
        assert!(hann_window(0).is_empty());
    }

    #[test]
    fn test_fractional_bin_clamps() {
        // 48 kHz / 4096 = 11.72 Hz per bin
        assert!((fractional_bin(1000.0, 48000, 4096) - 85.333).abs() < 1e-3);
        assert_eq!(fractional_bin(1.0, 48000, 4096), 1.0);
        assert_eq!(fractional_bin(30000.0, 48000, 4096), 2047.0);
        assert_eq!(fractional_bin(1000.0, 0, 4096), 1.0);
        assert_eq!(fractional_bin(1000.0, 48000, 2), 1.0);
    }

    #[test]
    fn test_silence_is_zero() {
        let mut est = estimator(48000);
        let mags = est.analyze(&vec![0.0; 4096]);
        assert!(mags.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_sine_peaks_at_its_band() {
        // Low bands sit only a couple of bins apart at 96 kHz, so they are
        // checked at the common capture rates only
        let cases: [(u32, &[usize]); 3] = [
            (44100, &[2, 10, 20, 33, 47, 58, 62]),
            (48000, &[2, 10, 20, 33, 47, 58, 62]),
            (96000, &[20, 33, 47, 58, 62]),
        ];
        for (sample_rate, bands) in cases {
            let mut est = estimator(sample_rate);
            for &band in bands {
                let freq = est.table().center_hz(band);
                let mags = est.analyze(&sine(freq, sample_rate, 4096, 0.8));
                for (other, &mag) in mags.iter().enumerate() {
                    if other.abs_diff(band) > 2 {
                        assert!(
                            mags[band] >= 3.0 * mag,
                            "{} Hz: band {} = {}, band {} = {}",
                            sample_rate,
                            band,
                            mags[band],
                            other,
                            mag
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_full_scale_magnitude() {
        // A Hann-windowed unit sine on an exact bin reads amplitude / 4
        let mut est = estimator(48000);
        let k = est.bins()[30];
        let freq = (k * 48000.0 / 4096.0) as f32;
        let mags = est.analyze(&sine(freq, 48000, 4096, 1.0));
        assert!((mags[30] - 0.25).abs() < 0.01, "{}", mags[30]);
    }

    #[test]
    fn test_sample_rate_change_rebuilds_bins() {
        let mut est = estimator(48000);
        let before = est.bins()[40];
        assert!(!est.set_sample_rate(48000));
        assert!(est.set_sample_rate(96000));
        assert!((est.bins()[40] - before / 2.0).abs() < 1e-9);
        assert_eq!(est.table().sample_rate(), 96000);
    }

    #[test]
    fn test_short_frame_is_zero_padded() {
        let mut est = SpectralEstimator::new(8, BandTable::new(48000, BandLayout::Segmented));
        let mags = est.analyze(&[1.0, 1.0]);
        assert!(mags.iter().all(|m| m.is_finite()));
    }
}
