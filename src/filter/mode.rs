use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the pointer is interpreted. Selected by the user, not by the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// Left half low-pass, right half high-pass, centered dead zone
    #[default]
    #[serde(alias = "LP/HP")]
    LowHighPass,
    #[serde(alias = "BP")]
    BandPass,
    #[serde(alias = "NO")]
    Notch,
    #[serde(alias = "PK")]
    Peaking,
    #[serde(alias = "LSC")]
    LowShelf,
    #[serde(alias = "HSC")]
    HighShelf,
}

impl FilterMode {
    pub const ALL: [FilterMode; 6] = [
        FilterMode::LowHighPass,
        FilterMode::BandPass,
        FilterMode::Notch,
        FilterMode::Peaking,
        FilterMode::LowShelf,
        FilterMode::HighShelf,
    ];

    /// Short menu label
    pub fn label(&self) -> &'static str {
        match self {
            FilterMode::LowHighPass => "LP/HP",
            FilterMode::BandPass => "BP",
            FilterMode::Notch => "NO",
            FilterMode::Peaking => "PK",
            FilterMode::LowShelf => "LSC",
            FilterMode::HighShelf => "HSC",
        }
    }

    fn long_name(&self) -> &'static str {
        match self {
            FilterMode::LowHighPass => "low-high-pass",
            FilterMode::BandPass => "band-pass",
            FilterMode::Notch => "notch",
            FilterMode::Peaking => "peaking",
            FilterMode::LowShelf => "low-shelf",
            FilterMode::HighShelf => "high-shelf",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    /// Accepts the short label or the long name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FilterMode::ALL
            .into_iter()
            .find(|mode| {
                mode.label().eq_ignore_ascii_case(wanted)
                    || mode.long_name().eq_ignore_ascii_case(wanted)
                    || mode.long_name().replace('-', "").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                let known: Vec<&str> = FilterMode::ALL.iter().map(|m| m.label()).collect();
                format!("unknown filter mode '{}' (expected one of {:?})", s, known)
            })
    }
}

/// Filter kind as understood by the DSP host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FilterType {
    #[default]
    Off,
    LowPass,
    HighPass,
    BandPass,
    Notch,
    Peaking,
    LowShelf,
    HighShelf,
}

impl FilterType {
    /// Directive token, `None` for `Off`
    pub fn token(&self) -> Option<&'static str> {
        match self {
            FilterType::Off => None,
            FilterType::LowPass => Some("LP"),
            FilterType::HighPass => Some("HP"),
            FilterType::BandPass => Some("BP"),
            FilterType::Notch => Some("NO"),
            FilterType::Peaking => Some("PK"),
            FilterType::LowShelf => Some("LSC"),
            FilterType::HighShelf => Some("HSC"),
        }
    }

    pub fn is_off(&self) -> bool {
        *self == FilterType::Off
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token().unwrap_or("OFF"))
    }
}

/// One evaluation of the mapper. A value, never shared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterDescriptor {
    pub filter_type: FilterType,
    pub frequency_hz: f64,
    pub q: f64,
    pub gain_db: f64,
}

impl FilterDescriptor {
    pub fn off(q: f64) -> Self {
        Self {
            filter_type: FilterType::Off,
            frequency_hz: 0.0,
            q,
            gain_db: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("LP/HP".parse::<FilterMode>(), Ok(FilterMode::LowHighPass));
        assert_eq!("pk".parse::<FilterMode>(), Ok(FilterMode::Peaking));
        assert_eq!("low-shelf".parse::<FilterMode>(), Ok(FilterMode::LowShelf));
        assert_eq!("HighShelf".parse::<FilterMode>(), Ok(FilterMode::HighShelf));
        assert_eq!(" notch ".parse::<FilterMode>(), Ok(FilterMode::Notch));
        assert!("lowpass".parse::<FilterMode>().is_err());
    }

    #[test]
    fn test_mode_labels_round_trip() {
        for mode in FilterMode::ALL {
            assert_eq!(mode.to_string().parse::<FilterMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_mode_deserializes_labels() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: FilterMode,
        }
        let w: Wrapper = toml::from_str("mode = \"PK\"").unwrap();
        assert_eq!(w.mode, FilterMode::Peaking);
        let w: Wrapper = toml::from_str("mode = \"low-high-pass\"").unwrap();
        assert_eq!(w.mode, FilterMode::LowHighPass);
    }

    #[test]
    fn test_type_tokens() {
        assert_eq!(FilterType::Off.token(), None);
        assert_eq!(FilterType::LowShelf.token(), Some("LSC"));
        assert_eq!(FilterType::Off.to_string(), "OFF");
    }
}
