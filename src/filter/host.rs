//! DSP host (Equalizer APO) discovery and include handshake
//!
//! The host reads `config.txt` from its config directory. We keep our filter in
//! a separate file and make sure `config.txt` includes it.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::sync::SyncError;

/// The host's main configuration file
pub const MAIN_CONFIG: &str = "config.txt";

/// File our directives go to, relative to the config directory
pub const DEFAULT_DIRECTIVE_FILE: &str = "deskwave.txt";

/// Install location used when nothing else points at the host
pub const DEFAULT_INSTALL_DIR: &str = r"C:\Program Files\EqualizerAPO";

/// Overrides the install location (stands in for the installer's registry entry)
pub const INSTALL_PATH_ENV: &str = "EQUALIZERAPO_INSTALL_PATH";

const CONFIG_SUBDIR: &str = "config";
const INCLUDE_MARKER: &str = "# Added by deskwave";

#[derive(Error, Debug)]
pub enum HostError {
    #[error("DSP host not found (set EQUALIZERAPO_INSTALL_PATH or --host-dir)")]
    NotFound,

    #[error("Host config directory does not exist: {0}")]
    MissingConfigDir(PathBuf),

    #[error("Failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to add include to {path}: {source}")]
    WriteInclude {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Destination for rendered directives
pub trait DirectiveSink {
    fn write_directive(&mut self, content: &str) -> Result<(), SyncError>;
}

/// A detected host config directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DspHost {
    config_dir: PathBuf,
    directive_file: String,
}

impl DspHost {
    /// Use `config_dir` as-is, without checking it
    pub fn at(config_dir: impl Into<PathBuf>, directive_file: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
            directive_file: directive_file.into(),
        }
    }

    /// Locate the host config directory.
    ///
    /// An explicit directory wins, then the install path from the environment,
    /// then the default install location (which must already hold `config.txt`).
    pub fn detect(explicit: Option<&Path>, directive_file: &str) -> Result<Self, HostError> {
        if let Some(dir) = explicit {
            if !dir.is_dir() {
                return Err(HostError::MissingConfigDir(dir.to_path_buf()));
            }
            log::info!("Using host config directory {}", dir.display());
            return Ok(Self::at(dir, directive_file));
        }

        if let Some(install) = std::env::var_os(INSTALL_PATH_ENV).filter(|v| !v.is_empty()) {
            let dir = PathBuf::from(install).join(CONFIG_SUBDIR);
            if dir.is_dir() {
                log::info!("Detected host via {}: {}", INSTALL_PATH_ENV, dir.display());
                return Ok(Self::at(dir, directive_file));
            }
            log::debug!("{} set but {} is missing", INSTALL_PATH_ENV, dir.display());
        }

        let dir = Path::new(DEFAULT_INSTALL_DIR).join(CONFIG_SUBDIR);
        if dir.is_dir() && dir.join(MAIN_CONFIG).is_file() {
            log::info!("Detected host at default path: {}", dir.display());
            return Ok(Self::at(dir, directive_file));
        }

        Err(HostError::NotFound)
    }

    /// Detect the host and make sure it includes our directive file
    pub fn connect(explicit: Option<&Path>, directive_file: &str) -> Result<Self, HostError> {
        let host = Self::detect(explicit, directive_file)?;
        host.ensure_include()?;
        Ok(host)
    }

    pub fn directive_path(&self) -> PathBuf {
        self.config_dir.join(&self.directive_file)
    }

    pub fn include_line(&self) -> String {
        format!("Include: {}", self.directive_file)
    }

    /// Append the include line to `config.txt` unless it is already there.
    ///
    /// Returns true when the file was changed.
    pub fn ensure_include(&self) -> Result<bool, HostError> {
        let path = self.config_dir.join(MAIN_CONFIG);
        let existing = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(HostError::ReadConfig { path, source }),
        };

        let include = self.include_line();
        if existing.lines().any(|line| line.trim() == include) {
            log::debug!("{} already includes {}", path.display(), self.directive_file);
            return Ok(false);
        }

        let mut addition = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            addition.push('\n');
        }
        addition.push('\n');
        addition.push_str(INCLUDE_MARKER);
        addition.push('\n');
        addition.push_str(&include);
        addition.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(addition.as_bytes()))
            .map_err(|source| HostError::WriteInclude {
                path: path.clone(),
                source,
            })?;

        log::info!("Added '{}' to {}", include, path.display());
        Ok(true)
    }
}

impl DirectiveSink for DspHost {
    fn write_directive(&mut self, content: &str) -> Result<(), SyncError> {
        let path = self.directive_path();
        fs::write(&path, content).map_err(|source| SyncError::Write { path, source })
    }
}
