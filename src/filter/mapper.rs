//! Pointer position to filter parameters
//!
//! X always drives frequency on a log axis. Y drives Q (pass/notch modes) or
//! gain (peaking and shelves); the top edge (y = 0) is high Q / full boost.

use crate::pointer::Pointer;

use super::mode::{FilterDescriptor, FilterMode, FilterType};

pub const MIN_FREQ_HZ: f64 = 80.0;
pub const MAX_FREQ_HZ: f64 = 16000.0;
pub const MIN_Q: f64 = 0.5;
pub const MAX_Q: f64 = 5.0;
pub const MIN_GAIN_DB: f64 = -15.0;
pub const MAX_GAIN_DB: f64 = 15.0;
/// Half-width of the Off zone around the horizontal center (LP/HP only)
pub const DEAD_ZONE: f64 = 0.05;
/// Fixed Q of the peaking filter
pub const PEAKING_Q: f64 = 2.0;
/// Default shelf slope
pub const SHELF_Q: f64 = 0.7;

const CENTER: f64 = 0.5;

/// Parameter ranges the pointer is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterRanges {
    pub min_freq_hz: f64,
    pub max_freq_hz: f64,
    pub min_q: f64,
    pub max_q: f64,
    pub min_gain_db: f64,
    pub max_gain_db: f64,
    pub dead_zone: f64,
    pub peaking_q: f64,
    pub shelf_q: f64,
}

impl Default for FilterRanges {
    fn default() -> Self {
        Self {
            min_freq_hz: MIN_FREQ_HZ,
            max_freq_hz: MAX_FREQ_HZ,
            min_q: MIN_Q,
            max_q: MAX_Q,
            min_gain_db: MIN_GAIN_DB,
            max_gain_db: MAX_GAIN_DB,
            dead_zone: DEAD_ZONE,
            peaking_q: PEAKING_Q,
            shelf_q: SHELF_Q,
        }
    }
}

impl FilterRanges {
    pub fn map(&self, pointer: Pointer, mode: FilterMode) -> FilterDescriptor {
        let Pointer { x, y } = Pointer::new(pointer.x, pointer.y);
        match mode {
            FilterMode::LowHighPass => self.low_high_pass(x, y),
            FilterMode::BandPass => self.freq_q(x, y, FilterType::BandPass),
            FilterMode::Notch => self.freq_q(x, y, FilterType::Notch),
            FilterMode::Peaking => FilterDescriptor {
                filter_type: FilterType::Peaking,
                frequency_hz: self.frequency(x),
                q: self.peaking_q,
                gain_db: self.gain(y),
            },
            FilterMode::LowShelf => self.shelf(x, y, FilterType::LowShelf),
            FilterMode::HighShelf => self.shelf(x, y, FilterType::HighShelf),
        }
    }

    /// Log-scaled frequency for `t` in [0, 1]
    pub fn frequency(&self, t: f64) -> f64 {
        self.min_freq_hz * (self.max_freq_hz / self.min_freq_hz).powf(t.clamp(0.0, 1.0))
    }

    /// Q from the vertical axis, top = max
    pub fn q(&self, y: f64) -> f64 {
        self.max_q - (self.max_q - self.min_q) * y
    }

    /// Gain from the vertical axis, top = boost, middle = 0 dB, bottom = cut
    pub fn gain(&self, y: f64) -> f64 {
        self.max_gain_db - (self.max_gain_db - self.min_gain_db) * y
    }

    fn low_high_pass(&self, x: f64, y: f64) -> FilterDescriptor {
        let q = self.q(y);
        let dead_zone = self.dead_zone.max(0.0);
        let span = (CENTER - dead_zone).max(f64::EPSILON);

        if x < CENTER - dead_zone {
            FilterDescriptor {
                filter_type: FilterType::LowPass,
                frequency_hz: self.frequency(x / span),
                q,
                gain_db: 0.0,
            }
        } else if x > CENTER + dead_zone {
            FilterDescriptor {
                filter_type: FilterType::HighPass,
                frequency_hz: self.frequency((x - CENTER - dead_zone) / span),
                q,
                gain_db: 0.0,
            }
        } else {
            FilterDescriptor::off(q)
        }
    }

    fn freq_q(&self, x: f64, y: f64, filter_type: FilterType) -> FilterDescriptor {
        FilterDescriptor {
            filter_type,
            frequency_hz: self.frequency(x),
            q: self.q(y),
            gain_db: 0.0,
        }
    }

    fn shelf(&self, x: f64, y: f64, filter_type: FilterType) -> FilterDescriptor {
        FilterDescriptor {
            filter_type,
            frequency_hz: self.frequency(x),
            q: self.shelf_q,
            gain_db: self.gain(y),
        }
    }
}

/// Map with the reference ranges
pub fn map(pointer: Pointer, mode: FilterMode) -> FilterDescriptor {
    FilterRanges::default().map(pointer, mode)
}
