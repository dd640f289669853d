//! Band center frequencies for the 64-point perceptual spectrum.

pub const BAND_COUNT: usize = 64;

/// Contiguous run of bands log-spaced between two frequencies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSegment {
    pub start: usize,
    pub end: usize,
    pub low_hz: f32,
    pub high_hz: f32,
}

impl BandSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    /// Center of band `index`, interpolated at the band midpoint
    fn center_hz(&self, index: usize) -> f32 {
        let t = (index - self.start) as f32 + 0.5;
        let t = t / self.len() as f32;
        self.low_hz * (self.high_hz / self.low_hz).powf(t)
    }
}

/// Kick and bass
pub const LOW_SEGMENT: BandSegment = BandSegment {
    start: 0,
    end: 12,
    low_hz: 30.0,
    high_hz: 200.0,
};

/// Vocals, snare, guitar
pub const MID_SEGMENT: BandSegment = BandSegment {
    start: 12,
    end: 54,
    low_hz: 200.0,
    high_hz: 4000.0,
};

/// Hats and cymbals
pub const HIGH_SEGMENT: BandSegment = BandSegment {
    start: 54,
    end: BAND_COUNT,
    low_hz: 4000.0,
    high_hz: 12000.0,
};

pub const SEGMENTS: [BandSegment; 3] = [LOW_SEGMENT, MID_SEGMENT, HIGH_SEGMENT];

/// Range covered by the linear layout
pub const LINEAR_LOW_HZ: f32 = 30.0;
pub const LINEAR_HIGH_HZ: f32 = 12000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandLayout {
    /// Three log-spaced segments (low, mid, high)
    #[default]
    Segmented,
    /// Evenly spaced centers between LINEAR_LOW_HZ and LINEAR_HIGH_HZ
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub index: usize,
    pub center_hz: f32,
}

/// Immutable band layout for one sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    sample_rate: u32,
    layout: BandLayout,
    bands: [Band; BAND_COUNT],
}

impl BandTable {
    pub fn new(sample_rate: u32, layout: BandLayout) -> Self {
        let bands = std::array::from_fn(|index| Band {
            index,
            center_hz: center_hz(layout, index),
        });
        Self {
            sample_rate,
            layout,
            bands,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn layout(&self) -> BandLayout {
        self.layout
    }

    pub fn bands(&self) -> &[Band; BAND_COUNT] {
        &self.bands
    }

    pub fn center_hz(&self, index: usize) -> f32 {
        self.bands[index].center_hz
    }

    /// Index of the band whose center is closest to `hz`
    pub fn nearest(&self, hz: f32) -> usize {
        self.bands
            .iter()
            .min_by(|a, b| (a.center_hz - hz).abs().total_cmp(&(b.center_hz - hz).abs()))
            .map_or(0, |band| band.index)
    }
}

pub fn segment_of(index: usize) -> Option<&'static BandSegment> {
    SEGMENTS.iter().find(|segment| segment.contains(index))
}

fn center_hz(layout: BandLayout, index: usize) -> f32 {
    match layout {
        BandLayout::Segmented => segment_of(index).map_or(0.0, |segment| segment.center_hz(index)),
        BandLayout::Linear => {
            let t = (index as f32 + 0.5) / BAND_COUNT as f32;
            LINEAR_LOW_HZ + (LINEAR_HIGH_HZ - LINEAR_LOW_HZ) * t
        }
    }
}
