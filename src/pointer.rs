//! Pointer sources for the filter controller
//!
//! Positions are normalized to `[0, 1]` on both axes, (0, 0) being the top-left
//! corner of the surface.

use std::f64::consts::TAU;
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, TryRecvError};

use crate::filter::mode::FilterMode;
use crate::filter::worker::SyncCommand;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

impl Pointer {
    pub const CENTER: Pointer = Pointer { x: 0.5, y: 0.5 };

    /// Clamp into `[0, 1]`; non-finite coordinates fall back to the center
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: sanitize(x),
            y: sanitize(y),
        }
    }
}

impl Default for Pointer {
    fn default() -> Self {
        Self::CENTER
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

pub trait PointerSource {
    /// Position for the tick at `elapsed` since the session started
    fn position(&mut self, elapsed: Duration) -> Pointer;

    /// Control requests that arrived since the last call
    fn take_commands(&mut self) -> Vec<SyncCommand> {
        Vec::new()
    }

    /// True once the source can produce nothing new
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Always reports the same position.
pub struct FixedPointer(pub Pointer);

impl PointerSource for FixedPointer {
    fn position(&mut self, _elapsed: Duration) -> Pointer {
        self.0
    }
}

/// Traces a slow Lissajous figure across the surface.
pub struct SweepPointer {
    period: Duration,
}

/// Time for one horizontal sweep
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(8);

impl SweepPointer {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for SweepPointer {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_PERIOD)
    }
}

impl PointerSource for SweepPointer {
    fn position(&mut self, elapsed: Duration) -> Pointer {
        let period = self.period.as_secs_f64().max(f64::EPSILON);
        let phase = elapsed.as_secs_f64() / period;
        Pointer::new(
            0.5 + 0.5 * (TAU * phase).sin(),
            0.5 + 0.5 * (TAU * phase * 2.0 / 3.0).cos(),
        )
    }
}

/// One parsed line of control input
#[derive(Debug, Clone, PartialEq)]
pub enum InputLine {
    Pointer(Pointer),
    Command(SyncCommand),
}

/// Parse `x y` / `x,y` positions and `mode <name>`, `enable`, `disable` commands
pub fn parse_line(line: &str) -> Option<InputLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut words = line.split_whitespace();
    match words.next()? {
        "mode" => {
            let mode: FilterMode = words.next()?.parse().ok()?;
            Some(InputLine::Command(SyncCommand::SetMode(mode)))
        }
        "enable" => Some(InputLine::Command(SyncCommand::SetEnabled(true))),
        "disable" => Some(InputLine::Command(SyncCommand::SetEnabled(false))),
        _ => {
            let mut coords = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::parse::<f64>);
            let x = coords.next()?.ok()?;
            let y = coords.next()?.ok()?;
            if coords.next().is_some() {
                return None;
            }
            Some(InputLine::Pointer(Pointer::new(x, y)))
        }
    }
}

/// Reads control lines from stdin on a helper thread; the latest position wins.
pub struct StdinPointer {
    lines: Receiver<InputLine>,
    last: Pointer,
    pending: Vec<SyncCommand>,
    closed: bool,
}

impl StdinPointer {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        thread::Builder::new()
            .name("deskwave-stdin".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    match parse_line(&line) {
                        Some(parsed) => {
                            if tx.send(parsed).is_err() {
                                break;
                            }
                        }
                        None => log::debug!("Ignoring input line: {:?}", line),
                    }
                }
                log::debug!("Stdin closed");
            })?;
        Ok(Self::from_receiver(rx))
    }

    pub fn from_receiver(lines: Receiver<InputLine>) -> Self {
        Self {
            lines,
            last: Pointer::CENTER,
            pending: Vec::new(),
            closed: false,
        }
    }

    fn drain(&mut self) {
        loop {
            match self.lines.try_recv() {
                Ok(InputLine::Pointer(pointer)) => self.last = pointer,
                Ok(InputLine::Command(command)) => self.pending.push(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

impl PointerSource for StdinPointer {
    fn position(&mut self, _elapsed: Duration) -> Pointer {
        self.drain();
        self.last
    }

    fn take_commands(&mut self) -> Vec<SyncCommand> {
        self.drain();
        std::mem::take(&mut self.pending)
    }

    fn is_exhausted(&self) -> bool {
        self.closed && self.pending.is_empty()
    }
}
