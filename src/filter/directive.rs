//! Directive text for the DSP host's include file

use super::mode::{FilterDescriptor, FilterType};

/// First line of every directive this application writes
pub const DIRECTIVE_HEADER: &str = "# deskwave auto-generated filter";

const DISABLED: &str = "# Filter disabled";
const DISABLED_CENTER: &str = "# Filter disabled (center)";

/// Render a descriptor. `Off` renders as the dead-zone comment.
pub fn render(desc: &FilterDescriptor) -> String {
    let token = match desc.filter_type.token() {
        Some(token) => token,
        None => return format!("{}\n{}", DIRECTIVE_HEADER, DISABLED_CENTER),
    };
    let freq = finite_or(desc.frequency_hz, 0.0);
    let q = finite_or(desc.q, 0.0);
    // `+ 0.0` turns -0.0 into 0.0 so a flat gain never renders as "-0.0"
    let gain = finite_or(desc.gain_db, 0.0) + 0.0;

    let line = match desc.filter_type {
        FilterType::Peaking => format!(
            "Filter: ON {} Fc {:.0} Hz Gain {:+.1} dB Q {:.2}",
            token, freq, gain, q
        ),
        FilterType::LowShelf | FilterType::HighShelf => {
            format!("Filter: ON {} Fc {:.0} Hz Gain {:+.1} dB", token, freq, gain)
        }
        _ => format!("Filter: ON {} Fc {:.0} Hz Q {:.2}", token, freq, q),
    };
    format!("{}\n{}", DIRECTIVE_HEADER, line)
}

/// The directive that leaves the host unfiltered
pub fn render_disabled() -> String {
    format!("{}\n{}", DIRECTIVE_HEADER, DISABLED)
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
