use std::sync::Arc;

use super::bands::BandTable;
use super::estimator::SpectralEstimator;
use super::ingest::{IngestCounters, SampleIngest};
use super::normalizer::{BandFeed, BandNormalizer, NormalizerSettings};
use super::params::{AnalysisParams, PcmFormat, DEFAULT_SAMPLE_RATE};

/// Capture-thread half of the analysis chain: ingest, estimate, normalize.
///
/// Moved wholesale into the capture callback. The only thing it shares with
/// other threads is the published band vector and the ingest counters.
pub struct AnalysisPipeline {
    ingest: SampleIngest,
    estimator: SpectralEstimator,
    normalizer: BandNormalizer,
}

impl AnalysisPipeline {
    pub fn new(params: &AnalysisParams) -> (Self, BandFeed) {
        Self::with_sample_rate(params, DEFAULT_SAMPLE_RATE)
    }

    pub fn with_sample_rate(params: &AnalysisParams, sample_rate: u32) -> (Self, BandFeed) {
        let table = BandTable::new(sample_rate, params.layout);
        let (normalizer, feed) = BandNormalizer::new(NormalizerSettings::from(params));
        let pipeline = Self {
            ingest: SampleIngest::new(params.frame_size, params.hop_size),
            estimator: SpectralEstimator::new(params.frame_size, table),
            normalizer,
        };
        (pipeline, feed)
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        self.ingest.counters()
    }

    pub fn table(&self) -> &BandTable {
        self.estimator.table()
    }

    /// Feed one raw capture buffer
    pub fn push(&mut self, bytes: &[u8], format: PcmFormat) {
        if format.sample_rate > 0 {
            self.estimator.set_sample_rate(format.sample_rate);
        }
        let Self {
            ingest,
            estimator,
            normalizer,
        } = self;
        ingest.ingest(bytes, format, |frame| {
            let magnitudes = estimator.analyze(frame);
            normalizer.update(&magnitudes);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::bands::BAND_COUNT;

    fn stereo_bytes(mono: &[f32]) -> Vec<u8> {
        mono.iter()
            .flat_map(|&s| [s, s])
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_silence_publishes_zero() {
        let (mut pipeline, feed) = AnalysisPipeline::new(&AnalysisParams::canonical());
        pipeline.push(&stereo_bytes(&vec![0.0; 4096]), PcmFormat::f32(48000, 2));
        assert!(feed.poll().is_some());
        assert_eq!(feed.snapshot(), [0.0; BAND_COUNT]);
        assert_eq!(pipeline.counters().stats().analyses, 1);
    }

    #[test]
    fn test_tone_lights_nearest_band() {
        let (mut pipeline, feed) = AnalysisPipeline::new(&AnalysisParams::canonical());
        let tone: Vec<f32> = (0..8192)
            .map(|i| (std::f64::consts::TAU * 440.0 * i as f64 / 48000.0).sin() as f32)
            .collect();
        pipeline.push(&stereo_bytes(&tone), PcmFormat::f32(48000, 2));

        let bands = feed.snapshot();
        let peak = bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, pipeline.table().nearest(440.0));
    }

    #[test]
    fn test_format_change_rebuilds_table() {
        let (mut pipeline, _feed) = AnalysisPipeline::new(&AnalysisParams::canonical());
        assert_eq!(pipeline.table().sample_rate(), 48000);
        pipeline.push(&stereo_bytes(&[0.0; 16]), PcmFormat::f32(44100, 2));
        assert_eq!(pipeline.table().sample_rate(), 44100);
    }
}
