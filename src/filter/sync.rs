//! Throttled, diff-aware directive writes
//!
//! The synchronizer decides when a mapped descriptor is worth a file write and
//! keeps the last written values to compare against. A write that fails leaves
//! every piece of state as it was, so the next qualifying tick retries it.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::pointer::Pointer;

use super::directive::{render, render_disabled};
use super::host::DirectiveSink;
use super::mapper::FilterRanges;
use super::mode::{FilterDescriptor, FilterMode, FilterType};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to write directive {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Minimum time between two writes of the same filter type
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    pub throttle: Duration,
    /// Relative frequency change that counts as significant
    pub min_frequency_change: f64,
    pub min_q_change: f64,
    pub min_gain_change_db: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
            min_frequency_change: 0.05,
            min_q_change: 0.1,
            min_gain_change_db: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    /// No host attached; every call is a no-op
    Uninitialized,
    /// Attached, host unfiltered
    Idle,
    /// Attached, a filter is applied
    Active,
}

/// Values of the last successful write. `last_type == None` means "nothing to
/// compare against", which makes the next descriptor write unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterSyncState {
    pub last_write: Option<Instant>,
    pub last_frequency_hz: f64,
    pub last_q: f64,
    pub last_gain_db: f64,
    pub last_type: Option<FilterType>,
}

impl FilterSyncState {
    fn clear_cache(&mut self) {
        self.last_frequency_hz = 0.0;
        self.last_q = 0.0;
        self.last_gain_db = 0.0;
        self.last_type = None;
    }

    fn record(&mut self, desc: &FilterDescriptor, now: Instant) {
        self.last_write = Some(now);
        self.last_frequency_hz = desc.frequency_hz;
        self.last_q = desc.q;
        self.last_gain_db = desc.gain_db;
        self.last_type = Some(desc.filter_type);
    }
}

/// What the display side shows about the filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStatus {
    pub filter_type: FilterType,
    pub frequency_hz: f64,
    pub q: f64,
    pub gain_db: f64,
    pub active: bool,
    pub mode: FilterMode,
    pub enabled: bool,
    pub available: bool,
}

impl Default for FilterStatus {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Off,
            frequency_hz: 0.0,
            q: 0.0,
            gain_db: 0.0,
            active: false,
            mode: FilterMode::default(),
            enabled: true,
            available: false,
        }
    }
}

/// Result of one synchronization attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// No host attached
    Unavailable,
    /// Filtering is switched off
    Disabled,
    /// Too soon after the previous write
    Throttled,
    /// No significant change since the previous write
    Unchanged,
    Written(FilterDescriptor),
}

pub struct FilterSynchronizer<S: DirectiveSink> {
    sink: Option<S>,
    ranges: FilterRanges,
    settings: SyncSettings,
    mode: FilterMode,
    enabled: bool,
    phase: SyncPhase,
    state: FilterSyncState,
    status: FilterStatus,
    unavailable_reported: bool,
    failing: bool,
}

impl<S: DirectiveSink> FilterSynchronizer<S> {
    pub fn new(settings: SyncSettings, ranges: FilterRanges) -> Self {
        Self {
            sink: None,
            ranges,
            settings,
            mode: FilterMode::default(),
            enabled: true,
            phase: SyncPhase::Uninitialized,
            state: FilterSyncState::default(),
            status: FilterStatus::default(),
            unavailable_reported: false,
            failing: false,
        }
    }

    /// Attach a host and start from the disabled directive
    pub fn attach(&mut self, sink: S) -> Result<(), SyncError> {
        self.sink = Some(sink);
        self.phase = SyncPhase::Idle;
        self.status.available = true;
        self.disable()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> &FilterSyncState {
        &self.state
    }

    pub fn status(&self) -> FilterStatus {
        self.status.clone()
    }

    /// Switch modes. A real change forces the next descriptor to be written.
    pub fn set_mode(&mut self, mode: FilterMode) {
        if self.mode == mode {
            return;
        }
        log::info!("Filter mode: {}", mode);
        self.mode = mode;
        self.status.mode = mode;
        self.state.clear_cache();
    }

    /// Turning filtering off while a filter is applied writes the disabled directive
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), SyncError> {
        if self.enabled != enabled {
            log::info!("Filter {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
        self.status.enabled = enabled;
        if !enabled && self.phase == SyncPhase::Active {
            self.disable()?;
        }
        Ok(())
    }

    /// Map the pointer under the current mode and synchronize the result
    pub fn update(&mut self, pointer: Pointer, now: Instant) -> Result<SyncOutcome, SyncError> {
        if !self.is_attached() {
            return Ok(SyncOutcome::Unavailable);
        }
        if !self.enabled {
            // A disable that failed earlier is retried until it lands
            if self.phase == SyncPhase::Active {
                self.disable()?;
            }
            return Ok(SyncOutcome::Disabled);
        }
        let desc = self.ranges.map(pointer, self.mode);
        self.submit(desc, now)
    }

    /// Write `desc` if it passes the throttle and change checks
    pub fn submit(&mut self, desc: FilterDescriptor, now: Instant) -> Result<SyncOutcome, SyncError> {
        if !self.is_attached() {
            return Ok(SyncOutcome::Unavailable);
        }

        let must_write = match self.state.last_type {
            None => true,
            Some(last_type) => last_type != desc.filter_type,
        };
        if !must_write {
            let elapsed = self
                .state
                .last_write
                .map_or(Duration::MAX, |last| now.saturating_duration_since(last));
            if elapsed < self.settings.throttle {
                return Ok(SyncOutcome::Throttled);
            }
            if !self.changed_enough(&desc) {
                return Ok(SyncOutcome::Unchanged);
            }
        }

        self.write(&render(&desc))?;

        self.state.record(&desc, now);
        self.phase = if desc.filter_type.is_off() {
            SyncPhase::Idle
        } else {
            SyncPhase::Active
        };
        self.status.filter_type = desc.filter_type;
        self.status.frequency_hz = desc.frequency_hz;
        self.status.q = desc.q;
        self.status.gain_db = desc.gain_db;
        self.status.active = self.phase == SyncPhase::Active;
        log::trace!("Wrote filter {:?}", desc);
        Ok(SyncOutcome::Written(desc))
    }

    /// Write the disabled directive and forget the last written values
    pub fn disable(&mut self) -> Result<(), SyncError> {
        if !self.is_attached() {
            return Ok(());
        }
        self.write(&render_disabled())?;

        self.state.clear_cache();
        self.phase = SyncPhase::Idle;
        self.status.filter_type = FilterType::Off;
        self.status.frequency_hz = 0.0;
        self.status.q = 0.0;
        self.status.gain_db = 0.0;
        self.status.active = false;
        Ok(())
    }

    /// Leave the host unfiltered before going away
    pub fn shutdown(&mut self) -> Result<(), SyncError> {
        if self.is_attached() {
            self.disable()?;
            log::info!("Filter cleared");
        }
        Ok(())
    }

    fn is_attached(&mut self) -> bool {
        if self.sink.is_some() {
            return true;
        }
        if !self.unavailable_reported {
            log::debug!("DSP host not attached; filter updates are ignored");
            self.unavailable_reported = true;
        }
        false
    }

    fn changed_enough(&self, desc: &FilterDescriptor) -> bool {
        // Center-off text does not depend on the values
        if desc.filter_type.is_off() {
            return false;
        }
        let state = &self.state;
        let freq_change =
            (desc.frequency_hz - state.last_frequency_hz).abs() / state.last_frequency_hz.max(1.0);
        freq_change >= self.settings.min_frequency_change
            || (desc.q - state.last_q).abs() >= self.settings.min_q_change
            || (desc.gain_db - state.last_gain_db).abs() >= self.settings.min_gain_change_db
    }

    fn write(&mut self, content: &str) -> Result<(), SyncError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        match sink.write_directive(content) {
            Ok(()) => {
                if self.failing {
                    log::info!("Directive writes recovered");
                    self.failing = false;
                }
                Ok(())
            }
            Err(err) => {
                if !self.failing {
                    log::warn!("{}", err);
                    self.failing = true;
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every write; fails while `fail` is set
    #[derive(Clone, Default)]
    struct RecordingSink {
        writes: Rc<RefCell<Vec<String>>>,
        fail: Rc<RefCell<bool>>,
    }

    impl DirectiveSink for RecordingSink {
        fn write_directive(&mut self, content: &str) -> Result<(), SyncError> {
            if *self.fail.borrow() {
                return Err(SyncError::Write {
                    path: PathBuf::from("test.txt"),
                    source: std::io::Error::other("refused"),
                });
            }
            self.writes.borrow_mut().push(content.to_string());
            Ok(())
        }
    }

    fn attached() -> (FilterSynchronizer<RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        let mut sync = FilterSynchronizer::new(SyncSettings::default(), FilterRanges::default());
        sync.attach(sink.clone()).unwrap();
        (sync, sink)
    }

    fn peaking(frequency_hz: f64, gain_db: f64) -> FilterDescriptor {
        FilterDescriptor {
            filter_type: FilterType::Peaking,
            frequency_hz,
            q: 2.0,
            gain_db,
        }
    }

    #[test]
    fn test_uninitialized_is_noop() {
        let mut sync: FilterSynchronizer<RecordingSink> =
            FilterSynchronizer::new(SyncSettings::default(), FilterRanges::default());
        let now = Instant::now();
        assert_eq!(sync.update(Pointer::new(0.1, 0.1), now).unwrap(), SyncOutcome::Unavailable);
        sync.disable().unwrap();
        sync.set_enabled(false).unwrap();
        sync.shutdown().unwrap();
        assert_eq!(sync.phase(), SyncPhase::Uninitialized);
        assert!(!sync.status().available);
    }

    #[test]
    fn test_attach_writes_disabled() {
        let (sync, sink) = attached();
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert_eq!(
            sink.writes.borrow().as_slice(),
            ["# deskwave auto-generated filter\n# Filter disabled"]
        );
    }

    #[test]
    fn test_small_fast_change_is_throttled() {
        let (mut sync, sink) = attached();
        let t0 = Instant::now();
        assert!(matches!(
            sync.submit(peaking(1000.0, 3.0), t0).unwrap(),
            SyncOutcome::Written(_)
        ));
        assert_eq!(sync.phase(), SyncPhase::Active);

        let t1 = t0 + Duration::from_millis(20);
        assert_eq!(sync.submit(peaking(1030.0, 3.0), t1).unwrap(), SyncOutcome::Throttled);

        let t2 = t0 + Duration::from_millis(60);
        assert_eq!(sync.submit(peaking(1030.0, 3.0), t2).unwrap(), SyncOutcome::Unchanged);

        // Large change, but still inside the throttle window
        assert_eq!(sync.submit(peaking(4000.0, 3.0), t1).unwrap(), SyncOutcome::Throttled);
        assert!(matches!(
            sync.submit(peaking(1060.0, 3.0), t2).unwrap(),
            SyncOutcome::Written(_)
        ));
        assert_eq!(sink.writes.borrow().len(), 3);
    }

    #[test]
    fn test_each_threshold_triggers_a_write() {
        let (mut sync, _sink) = attached();
        let mut now = Instant::now();
        sync.submit(peaking(1000.0, 0.0), now).unwrap();

        now += Duration::from_millis(50);
        assert!(matches!(sync.submit(peaking(1000.0, 0.5), now).unwrap(), SyncOutcome::Written(_)));

        now += Duration::from_millis(50);
        let mut q_change = peaking(1000.0, 0.5);
        q_change.q = 2.1;
        assert!(matches!(sync.submit(q_change, now).unwrap(), SyncOutcome::Written(_)));

        now += Duration::from_millis(50);
        let mut tiny = q_change;
        tiny.q = 2.15;
        tiny.gain_db = 0.9;
        assert_eq!(sync.submit(tiny, now).unwrap(), SyncOutcome::Unchanged);
    }

    #[test]
    fn test_type_change_writes_immediately() {
        let (mut sync, sink) = attached();
        let t0 = Instant::now();
        sync.update(Pointer::new(0.2, 0.5), t0).unwrap();
        assert_eq!(sync.status().filter_type, FilterType::LowPass);

        let t1 = t0 + Duration::from_millis(1);
        let outcome = sync.update(Pointer::new(0.8, 0.5), t1).unwrap();
        assert!(matches!(outcome, SyncOutcome::Written(d) if d.filter_type == FilterType::HighPass));

        let outcome = sync.update(Pointer::CENTER, t1 + Duration::from_millis(1)).unwrap();
        assert!(matches!(outcome, SyncOutcome::Written(d) if d.filter_type == FilterType::Off));
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert!(sink
            .writes
            .borrow()
            .last()
            .is_some_and(|w| w.ends_with("# Filter disabled (center)")));
    }

    #[test]
    fn test_write_failure_leaves_state_untouched() {
        let (mut sync, sink) = attached();
        let t0 = Instant::now();
        sync.submit(peaking(1000.0, 3.0), t0).unwrap();
        let before_state = *sync.state();
        let before_status = sync.status();

        *sink.fail.borrow_mut() = true;
        let t1 = t0 + Duration::from_millis(100);
        assert!(sync.submit(peaking(5000.0, -6.0), t1).is_err());
        assert_eq!(*sync.state(), before_state);
        assert_eq!(sync.status(), before_status);
        assert_eq!(sync.phase(), SyncPhase::Active);

        // Retried on the next qualifying tick
        *sink.fail.borrow_mut() = false;
        let t2 = t1 + Duration::from_millis(16);
        assert!(matches!(
            sync.submit(peaking(5000.0, -6.0), t2).unwrap(),
            SyncOutcome::Written(_)
        ));
        assert_eq!(sync.status().frequency_hz, 5000.0);
    }

    #[test]
    fn test_mode_change_forces_write() {
        let (mut sync, _sink) = attached();
        let t0 = Instant::now();
        sync.set_mode(FilterMode::BandPass);
        sync.update(Pointer::new(0.3, 0.3), t0).unwrap();

        sync.set_mode(FilterMode::Notch);
        let outcome = sync.update(Pointer::new(0.3, 0.3), t0 + Duration::from_millis(1)).unwrap();
        assert!(matches!(outcome, SyncOutcome::Written(d) if d.filter_type == FilterType::Notch));

        // Same mode again keeps the cache
        sync.set_mode(FilterMode::Notch);
        let outcome = sync.update(Pointer::new(0.3, 0.3), t0 + Duration::from_millis(2)).unwrap();
        assert_eq!(outcome, SyncOutcome::Throttled);
    }

    #[test]
    fn test_disabling_while_active_clears_filter() {
        let (mut sync, sink) = attached();
        let t0 = Instant::now();
        sync.update(Pointer::new(0.1, 0.1), t0).unwrap();
        assert_eq!(sync.phase(), SyncPhase::Active);

        sync.set_enabled(false).unwrap();
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert!(!sync.status().active);
        assert!(sink.writes.borrow().last().is_some_and(|w| w.ends_with("# Filter disabled")));
        assert_eq!(
            sync.update(Pointer::new(0.1, 0.1), t0 + Duration::from_secs(1)).unwrap(),
            SyncOutcome::Disabled
        );

        // Re-enabling writes right away, even inside the throttle window
        sync.set_enabled(true).unwrap();
        let outcome = sync.update(Pointer::new(0.1, 0.1), t0 + Duration::from_millis(1)).unwrap();
        assert!(matches!(outcome, SyncOutcome::Written(_)));
    }

    #[test]
    fn test_failed_disable_is_retried_on_next_tick() {
        let (mut sync, sink) = attached();
        let t0 = Instant::now();
        sync.update(Pointer::new(0.1, 0.1), t0).unwrap();
        let writes_before = sink.writes.borrow().len();

        *sink.fail.borrow_mut() = true;
        assert!(sync.set_enabled(false).is_err());
        assert_eq!(sync.phase(), SyncPhase::Active);
        assert!(sync.status().active);
        assert!(!sync.status().enabled);

        // Still failing: the tick reports the error again
        assert!(sync.update(Pointer::new(0.1, 0.1), t0 + Duration::from_millis(16)).is_err());

        *sink.fail.borrow_mut() = false;
        let outcome = sync.update(Pointer::new(0.1, 0.1), t0 + Duration::from_millis(32)).unwrap();
        assert_eq!(outcome, SyncOutcome::Disabled);
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert!(!sync.status().active);
        assert_eq!(
            sink.writes.borrow().last().map(String::as_str),
            Some("# deskwave auto-generated filter\n# Filter disabled")
        );

        // Once idle, disabled ticks stop writing
        sync.update(Pointer::new(0.1, 0.1), t0 + Duration::from_millis(48)).unwrap();
        assert_eq!(sink.writes.borrow().len(), writes_before + 1);
    }

    #[test]
    fn test_center_is_not_rewritten_when_y_moves() {
        let (mut sync, sink) = attached();
        let t0 = Instant::now();
        let outcome = sync.update(Pointer::new(0.5, 0.1), t0).unwrap();
        assert!(matches!(outcome, SyncOutcome::Written(d) if d.filter_type == FilterType::Off));
        let writes = sink.writes.borrow().len();

        let outcome = sync.update(Pointer::new(0.5, 0.9), t0 + Duration::from_millis(60)).unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(sink.writes.borrow().len(), writes);
    }

    #[test]
    fn test_failed_shutdown_keeps_filter_and_can_be_repeated() {
        let (mut sync, sink) = attached();
        sync.submit(peaking(2000.0, 6.0), Instant::now()).unwrap();
        let before_state = *sync.state();

        *sink.fail.borrow_mut() = true;
        assert!(sync.shutdown().is_err());
        assert_eq!(sync.phase(), SyncPhase::Active);
        assert_eq!(*sync.state(), before_state);
        assert!(sync.status().active);

        *sink.fail.borrow_mut() = false;
        sync.shutdown().unwrap();
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert_eq!(
            sink.writes.borrow().last().map(String::as_str),
            Some("# deskwave auto-generated filter\n# Filter disabled")
        );
    }

    #[test]
    fn test_shutdown_writes_disabled() {
        let (mut sync, sink) = attached();
        sync.update(Pointer::new(0.9, 0.9), Instant::now()).unwrap();
        sync.shutdown().unwrap();
        assert_eq!(
            sink.writes.borrow().last().map(String::as_str),
            Some("# deskwave auto-generated filter\n# Filter disabled")
        );
        assert_eq!(sync.phase(), SyncPhase::Idle);
    }
}
