use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use deskwave::audio::params::AnalysisProfile;
use deskwave::filter::mode::FilterMode;
use deskwave::session::DEFAULT_FPS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PointerKind {
    /// Hold the position given by --at
    #[default]
    Fixed,
    /// Sweep the surface on a slow Lissajous path
    Sweep,
    /// Read "x y" lines and commands from stdin
    Stdin,
}

#[derive(Parser, Debug)]
#[command(
    name = "deskwave",
    about = "Loopback audio band telemetry with pointer-driven Equalizer APO filtering"
)]
pub struct Cli {
    /// Audio file to replay instead of capturing the default output device
    pub input: Option<PathBuf>,

    /// Config file (default: ./deskwave.toml, then the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Filter mode: LP/HP, BP, NO, PK, LSC, HSC
    #[arg(short, long, default_value = "LP/HP")]
    pub mode: FilterMode,

    /// Start with filtering switched off
    #[arg(long)]
    pub no_filter: bool,

    /// Where pointer positions come from
    #[arg(long, value_enum, default_value_t = PointerKind::Fixed)]
    pub pointer: PointerKind,

    /// Fixed pointer position as "x,y" in [0, 1]
    #[arg(long, default_value = "0.5,0.5")]
    pub at: String,

    /// Display ticks per second
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Equalizer APO config directory (skips detection)
    #[arg(long)]
    pub host_dir: Option<PathBuf>,

    /// Analysis constants
    #[arg(long, value_enum, default_value_t = AnalysisProfile::Canonical)]
    pub profile: AnalysisProfile,

    /// Smoothing factor, weight kept from the previous frame (0.0-1.0)
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Do not print band frames to stdout
    #[arg(long)]
    pub no_feed: bool,
}
