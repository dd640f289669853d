//! dB compression, smoothing and publication of the band vector
//!
//! The capture thread owns the [`BandNormalizer`] and the producer side of a
//! triple buffer; consumers hold a [`BandFeed`] and only ever see fully
//! computed vectors. Publishing never blocks the capture thread.

use std::sync::{Arc, Mutex, MutexGuard};

use triple_buffer::{triple_buffer, Input, Output};

use super::bands::BAND_COUNT;
use super::estimator::BandMagnitudes;
use super::params::{AnalysisParams, DB_FLOOR, MAGNITUDE_EPSILON};

/// Normalized band energies, each in [0, 1]
pub type BandFrame = [f32; BAND_COUNT];

pub const SILENT_FRAME: BandFrame = [0.0; BAND_COUNT];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizerSettings {
    pub db_min: f32,
    pub db_max: f32,
    /// Weight kept from the previous smoothed value
    pub smoothing: f32,
}

impl From<&AnalysisParams> for NormalizerSettings {
    fn from(params: &AnalysisParams) -> Self {
        Self {
            db_min: params.db_min,
            db_max: params.db_max,
            smoothing: params.smoothing,
        }
    }
}

pub struct BandNormalizer {
    settings: NormalizerSettings,
    current: BandFrame,
    publisher: Input<BandFrame>,
}

impl BandNormalizer {
    pub fn new(settings: NormalizerSettings) -> (Self, BandFeed) {
        let (publisher, output) = triple_buffer(&SILENT_FRAME);
        let settings = NormalizerSettings {
            smoothing: sanitize_smoothing(settings.smoothing),
            ..settings
        };
        let normalizer = Self {
            settings,
            current: SILENT_FRAME,
            publisher,
        };
        (normalizer, BandFeed::new(output))
    }

    /// Fold one set of magnitudes into the smoothed vector and publish it
    pub fn update(&mut self, magnitudes: &BandMagnitudes) {
        let alpha = self.settings.smoothing;
        for (smoothed, &magnitude) in self.current.iter_mut().zip(magnitudes.iter()) {
            let level = normalize_db(
                magnitude_to_db(magnitude),
                self.settings.db_min,
                self.settings.db_max,
            );
            *smoothed = (*smoothed * alpha + level * (1.0 - alpha)).clamp(0.0, 1.0);
        }
        self.publisher.write(self.current);
    }

    /// The smoothing stage's working vector (capture thread only)
    pub fn current(&self) -> &BandFrame {
        &self.current
    }
}

/// `20 * log10(magnitude)`, or the floor for silence, negatives and NaN
pub fn magnitude_to_db(magnitude: f32) -> f32 {
    if magnitude >= MAGNITUDE_EPSILON && magnitude.is_finite() {
        20.0 * magnitude.log10()
    } else if magnitude == f32::INFINITY {
        0.0
    } else {
        DB_FLOOR
    }
}

/// Map `[db_min, db_max]` onto `[0, 1]`, clamped
pub fn normalize_db(db: f32, db_min: f32, db_max: f32) -> f32 {
    let span = (db_max - db_min).max(f32::EPSILON);
    ((db - db_min) / span).clamp(0.0, 1.0)
}

fn sanitize_smoothing(smoothing: f32) -> f32 {
    if smoothing.is_finite() {
        smoothing.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Consumer handle for the published band vector. Cheap to clone and safe to
/// use from any thread; the capture thread never waits on it.
#[derive(Clone)]
pub struct BandFeed {
    output: Arc<Mutex<Output<BandFrame>>>,
}

impl BandFeed {
    fn new(output: Output<BandFrame>) -> Self {
        Self {
            output: Arc::new(Mutex::new(output)),
        }
    }

    /// A feed that never receives data, for when capture could not start
    pub fn silent() -> Self {
        let (_, output) = triple_buffer(&SILENT_FRAME);
        Self::new(output)
    }

    /// Latest fully computed vector
    pub fn snapshot(&self) -> BandFrame {
        *self.lock().read()
    }

    /// Latest vector, but only if one was published since the last read
    pub fn poll(&self) -> Option<BandFrame> {
        let mut output = self.lock();
        if output.updated() {
            Some(*output.read())
        } else {
            None
        }
    }

    fn lock(&self) -> MutexGuard<'_, Output<BandFrame>> {
        // Reads cannot leave the output half-updated, so a poisoned lock is still usable
        self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::params::{DB_MAX, DB_MIN, SMOOTHING};

    fn settings() -> NormalizerSettings {
        NormalizerSettings {
            db_min: DB_MIN,
            db_max: DB_MAX,
            smoothing: SMOOTHING,
        }
    }

    #[test]
    fn test_db_conversion() {
        assert_eq!(magnitude_to_db(0.0), DB_FLOOR);
        assert_eq!(magnitude_to_db(-1.0), DB_FLOOR);
        assert_eq!(magnitude_to_db(f32::NAN), DB_FLOOR);
        assert_eq!(magnitude_to_db(1e-11), DB_FLOOR);
        assert!((magnitude_to_db(0.1) + 20.0).abs() < 1e-4);
        assert!((magnitude_to_db(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_window() {
        assert_eq!(normalize_db(-80.0, DB_MIN, DB_MAX), 0.0);
        assert_eq!(normalize_db(-20.0, DB_MIN, DB_MAX), 1.0);
        assert!((normalize_db(-50.0, DB_MIN, DB_MAX) - 0.5).abs() < 1e-6);
        assert_eq!(normalize_db(DB_FLOOR, DB_MIN, DB_MAX), 0.0);
        assert_eq!(normalize_db(0.0, DB_MIN, DB_MAX), 1.0);
        // Degenerate window stays finite
        assert!(normalize_db(-50.0, -50.0, -50.0).is_finite());
    }

    #[test]
    fn test_smoothing_blends_previous_value() {
        let (mut normalizer, feed) = BandNormalizer::new(settings());
        // -20 dB maps to 1.0
        normalizer.update(&[0.1; BAND_COUNT]);
        let first = feed.snapshot();
        assert!((first[0] - 0.7).abs() < 1e-5);
        normalizer.update(&[0.1; BAND_COUNT]);
        let second = feed.snapshot();
        assert!((second[0] - (0.7 * 0.3 + 0.7)).abs() < 1e-5);
        normalizer.update(&[0.0; BAND_COUNT]);
        assert!((feed.snapshot()[0] - second[0] * 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let (mut normalizer, feed) = BandNormalizer::new(settings());
        normalizer.update(&[0.01; BAND_COUNT]);
        let a = feed.snapshot();
        let b = feed.snapshot();
        assert_eq!(a, b);
        assert_eq!(&a, normalizer.current());
    }

    #[test]
    fn test_poll_reports_only_new_frames() {
        let (mut normalizer, feed) = BandNormalizer::new(settings());
        assert_eq!(feed.poll(), None);
        normalizer.update(&[0.01; BAND_COUNT]);
        assert!(feed.poll().is_some());
        assert_eq!(feed.poll(), None);
        assert_eq!(feed.snapshot(), *normalizer.current());
    }

    #[test]
    fn test_silent_feed_reads_zero() {
        let feed = BandFeed::silent();
        assert_eq!(feed.snapshot(), SILENT_FRAME);
        assert_eq!(feed.poll(), None);
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        let (mut normalizer, feed) = BandNormalizer::new(settings());
        let mut mags = [0.0; BAND_COUNT];
        mags[0] = f32::NAN;
        mags[1] = f32::INFINITY;
        mags[2] = 10.0;
        mags[3] = -3.0;
        normalizer.update(&mags);
        for value in feed.snapshot() {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_snapshot_from_other_thread() {
        let (mut normalizer, feed) = BandNormalizer::new(settings());
        let reader = {
            let feed = feed.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let frame = feed.snapshot();
                    // Every published vector is uniform, so a torn read would show
                    assert!(frame.iter().all(|&v| v == frame[0]));
                }
            })
        };
        for i in 0..1000 {
            let level = if i % 2 == 0 { 0.1 } else { 0.001 };
            normalizer.update(&[level; BAND_COUNT]);
        }
        reader.join().unwrap();
    }
}
