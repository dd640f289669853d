mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use cli::{Cli, PointerKind};
use config::Config;
use deskwave::audio::capture::{CaptureSource, FileReplay};
use deskwave::audio::params::{AnalysisParams, AnalysisProfile};
use deskwave::filter::host::DspHost;
use deskwave::filter::mapper::FilterRanges;
use deskwave::filter::mode::FilterMode;
use deskwave::filter::sync::{FilterSynchronizer, SyncSettings};
use deskwave::filter::worker::SyncWorker;
use deskwave::pointer::{parse_line, FixedPointer, InputLine, PointerSource, StdinPointer, SweepPointer};
use deskwave::session::{Session, SessionOptions, DEFAULT_FPS};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            Err(err) => log::warn!("Ignoring config: {:#}", err),
        }
    }

    // Merge: config values apply only when CLI is at its default
    if cli.mode == FilterMode::default() { cli.mode = cfg.filter.mode; }
    if cli.profile == AnalysisProfile::default() { cli.profile = cfg.analysis.profile; }
    if cli.fps == DEFAULT_FPS { cli.fps = cfg.display.fps; }
    if cli.host_dir.is_none() {
        cli.host_dir = cfg.host.config_dir.clone();
    }
    let filter_enabled = !cli.no_filter && cfg.filter.enabled;

    let mut params = AnalysisParams::for_profile(cli.profile);
    cfg.analysis.apply(&mut params);
    if let Some(smoothing) = cli.smoothing {
        params.smoothing = smoothing;
    }
    params.validate().context("Invalid analysis settings")?;

    log::info!("deskwave - loopback band telemetry");
    log::info!(
        "Analysis: {:?} profile, frame {}, hop {}, smoothing {}",
        cli.profile,
        params.frame_size,
        params.hop_size,
        params.smoothing
    );

    // 1. Filter sync
    let settings = SyncSettings {
        throttle: Duration::from_millis(cfg.filter.throttle_ms),
        ..SyncSettings::default()
    };
    let mut sync = FilterSynchronizer::new(settings, FilterRanges::default());
    sync.set_mode(cli.mode);
    match DspHost::connect(cli.host_dir.as_deref(), &cfg.host.directive_file) {
        Ok(host) => {
            log::info!("Writing filters to {}", host.directive_path().display());
            if let Err(err) = sync.attach(host) {
                log::warn!("Initial directive write failed: {}", err);
            }
        }
        Err(err) => log::warn!("Filter sync unavailable: {}", err),
    }
    if let Err(err) = sync.set_enabled(filter_enabled) {
        log::warn!("{}", err);
    }
    let worker = SyncWorker::spawn(sync).context("Failed to start filter worker")?;

    // 2. Pointer
    let pointer: Box<dyn PointerSource> = match cli.pointer {
        PointerKind::Fixed => match parse_line(&cli.at) {
            Some(InputLine::Pointer(position)) => Box::new(FixedPointer(position)),
            _ => anyhow::bail!("Invalid --at position '{}', expected \"x,y\"", cli.at),
        },
        PointerKind::Sweep => Box::new(SweepPointer::default()),
        PointerKind::Stdin => {
            Box::new(StdinPointer::spawn().context("Failed to start stdin reader")?)
        }
    };

    // 3. Capture
    let capture: Box<dyn CaptureSource> = match cli.input {
        Some(ref input) => {
            if !input.exists() {
                anyhow::bail!("Input file not found: {}", input.display());
            }
            log::info!("Input: {}", input.display());
            Box::new(FileReplay::new(input))
        }
        None => loopback_capture()?,
    };

    // 4. Display loop
    let options = SessionOptions {
        fps: cli.fps,
        duration: cli.duration.filter(|d| d.is_finite() && *d > 0.0).map(Duration::from_secs_f64),
        emit_feed: !cli.no_feed,
    };
    let mut session = Session::start(
        capture,
        &params,
        pointer,
        worker,
        options,
        std::io::stdout().lock(),
    );
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, session.interrupt_flag())
            .context("Failed to install signal handler")?;
    }

    let summary = session.run();
    log::info!(
        "Final filter: {}",
        serde_json::to_string(&summary.filter).context("Failed to serialize filter status")?
    );
    Ok(())
}

#[cfg(feature = "loopback")]
fn loopback_capture() -> Result<Box<dyn CaptureSource>> {
    Ok(Box::new(deskwave::audio::capture::LoopbackCapture::new()))
}

#[cfg(not(feature = "loopback"))]
fn loopback_capture() -> Result<Box<dyn CaptureSource>> {
    anyhow::bail!(
        "Live capture requires the 'loopback' feature. \
         Pass an audio file to replay, or rebuild with: cargo build --features loopback"
    )
}
