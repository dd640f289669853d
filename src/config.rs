use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use deskwave::audio::params::{AnalysisParams, AnalysisProfile};
use deskwave::filter::host::DEFAULT_DIRECTIVE_FILE;
use deskwave::filter::mode::FilterMode;
use deskwave::session::DEFAULT_FPS;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Unset fields keep the profile's value
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub profile: AnalysisProfile,
    pub frame_size: Option<usize>,
    pub hop_size: Option<usize>,
    pub smoothing: Option<f32>,
    pub db_min: Option<f32>,
    pub db_max: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    pub config_dir: Option<PathBuf>,
    #[serde(default = "default_directive_file")]
    pub directive_file: String,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl AnalysisConfig {
    pub fn apply(&self, params: &mut AnalysisParams) {
        if let Some(frame_size) = self.frame_size {
            params.frame_size = frame_size;
        }
        if let Some(hop_size) = self.hop_size {
            params.hop_size = hop_size;
        }
        if let Some(smoothing) = self.smoothing {
            params.smoothing = smoothing;
        }
        if let Some(db_min) = self.db_min {
            params.db_min = db_min;
        }
        if let Some(db_max) = self.db_max {
            params.db_max = db_max;
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mode: FilterMode::default(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            config_dir: None,
            directive_file: default_directive_file(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

fn default_enabled() -> bool { true }
fn default_throttle_ms() -> u64 { 50 }
fn default_directive_file() -> String { DEFAULT_DIRECTIVE_FILE.into() }
fn default_fps() -> u32 { DEFAULT_FPS }

/// Explicit path, then ./deskwave.toml, then the per-user config locations
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("deskwave.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("deskwave").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("deskwave").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
