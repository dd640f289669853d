//! deskwave - loopback audio telemetry for desktop visualizers.
//!
//! Captured audio is reduced to 64 perceptual band energies for a visual feed,
//! while a pointer position drives an Equalizer APO style filter directive file.

pub mod audio;
pub mod feed;
pub mod filter;
pub mod pointer;
pub mod session;
