//! Display-side band output
//!
//! Each changed snapshot goes out as one JSON array of 64 numbers per line.

use std::io::{self, Write};

use crate::audio::normalizer::{BandFeed, BandFrame};

pub struct BandEmitter<W: Write> {
    feed: BandFeed,
    out: W,
    emitted: u64,
}

impl<W: Write> BandEmitter<W> {
    pub fn new(feed: BandFeed, out: W) -> Self {
        Self {
            feed,
            out,
            emitted: 0,
        }
    }

    /// Write the latest snapshot if it changed since the last call
    pub fn emit_if_changed(&mut self) -> io::Result<bool> {
        match self.feed.poll() {
            Some(frame) => {
                self.write_frame(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn write_frame(&mut self, frame: &BandFrame) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &frame[..])?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.emitted += 1;
        Ok(())
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::normalizer::{BandNormalizer, NormalizerSettings};
    use crate::audio::params::AnalysisParams;

    #[test]
    fn test_emits_only_changed_frames() {
        let (mut normalizer, feed) =
            BandNormalizer::new(NormalizerSettings::from(&AnalysisParams::canonical()));
        let mut emitter = BandEmitter::new(feed, Vec::new());

        assert!(!emitter.emit_if_changed().unwrap());

        normalizer.update(&[1.0; 64]);
        assert!(emitter.emit_if_changed().unwrap());
        assert!(!emitter.emit_if_changed().unwrap());
        assert_eq!(emitter.emitted(), 1);

        let text = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 1);
        let values: Vec<f32> = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(values.len(), 64);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v) && *v > 0.0));
    }

    #[test]
    fn test_silent_feed_stays_quiet() {
        let mut emitter = BandEmitter::new(BandFeed::silent(), Vec::new());
        for _ in 0..5 {
            assert!(!emitter.emit_if_changed().unwrap());
        }
        assert!(emitter.into_inner().is_empty());
    }
}
